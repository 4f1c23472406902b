mod limiter;
mod loader;
mod root;
mod telemetry;
mod timeout;

pub use limiter::{LimiterConfig, RateConfig, DEFAULT_CLEANUP_INTERVAL_MINUTES};
pub use loader::{load_from_path, parse, validate};
pub use root::Config;
pub use telemetry::{LoggingConfig, TelemetryConfig};
pub use timeout::{KeepAliveConfig, TimeoutConfig};
