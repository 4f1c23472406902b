//! Rate limiting engine for Tollgate.
//!
//! Limits are enforced in two tiers per route, both built on a lazily-refilled
//! [`TokenBucket`]:
//!
//! - **Client tier**: one bucket per client address, created on first sight and evicted
//!   by a periodic sweep once idle.
//! - **Route tier**: a single bucket shared by every client of the route.
//!
//! # Architecture
//!
//! 1. **TokenBucket** (`bucket.rs`): refill rate plus burst capacity, non-blocking
//!    admission test guarded by a mutex.
//!
//! 2. **LimiterGroup** (`group.rs`): per-route state. Holds the optional route bucket and
//!    a reader/writer-locked map of [`ClientEntry`] records, filled with a double-checked
//!    insert and pruned by a sweeper task owned by the group.
//!
//! 3. **LimiterRegistry** (`registry.rs`): route -> group map built once from the
//!    configuration. Routes with both tiers at zero are not registered.
//!
//! # Configuration
//!
//! ```toml
//! [[limiters]]
//! endpoint = "/api/widgets"
//! rate_config = { rate_limit = 50.0, burst = 100, client_rate_limit = 5.0, client_burst = 10 }
//! ```

mod bucket;
mod group;
mod registry;

pub use bucket::TokenBucket;
pub use group::{ClientEntry, LimiterGroup};
pub use registry::{LimiterRegistry, UNLIMITED_ROUTE_LABEL};

/// Which limiting tier rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitTier {
    Client,
    Route,
}

impl LimitTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitTier::Client => "client",
            LimitTier::Route => "route",
        }
    }
}
