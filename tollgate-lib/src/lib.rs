#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod proxy;
pub mod security;
pub mod telemetry;

pub use config::{load_from_path, Config, LimiterConfig, RateConfig};
pub use error::{ProxyError, Result};
pub use proxy::{run, serve, RateLimitMiddleware};
pub use security::{ClientAddr, LimiterGroup, LimiterRegistry, TokenBucket};
