pub mod headers;
pub mod rate_limit;
pub mod request;

pub use headers::{add_forwarded_headers, strip_hop_by_hop};
pub use rate_limit::{check_rate_limit, RateLimitMiddleware};
pub use request::{handle_proxy_request, ProxyService};
