pub mod client_key;
pub mod rate_limit;
pub mod route_key;

pub use client_key::{extract_client_key, ClientAddr, ClientKeyError};
pub use rate_limit::{
    ClientEntry, LimitTier, LimiterGroup, LimiterRegistry, TokenBucket, UNLIMITED_ROUTE_LABEL,
};
pub use route_key::route_key;
