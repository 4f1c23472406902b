pub mod connection;
pub mod forwarding;
pub mod handler;
pub mod http_result;
pub mod server;
pub mod synthetic_response;

pub use forwarding::UpstreamForwarder;
pub use handler::{check_rate_limit, ProxyService, RateLimitMiddleware};
pub use http_result::{HttpError, HttpResult};
pub use server::{run, serve};
pub use synthetic_response::{synthetic_error_response, RespBody};
