use ahash::{AHashMap, AHashSet};
use std::sync::Arc;
use tracing::debug;

use super::LimiterGroup;
use crate::config::LimiterConfig;
use crate::error::{ProxyError, Result};
use crate::telemetry::Metrics;

/// Metric label shared by every route without a registered limiter
pub const UNLIMITED_ROUTE_LABEL: &str = "unlimited";

/// Route -> limiter group mapping, built once at startup and read-only afterwards.
///
/// Lookups need no lock since the set of routes never changes at runtime; all mutable
/// state lives inside the individual groups.
#[derive(Default)]
pub struct LimiterRegistry {
    groups: AHashMap<String, Arc<LimiterGroup>>,
}

impl LimiterRegistry {
    /// Create a registry with one group per limited route and start every sweeper.
    ///
    /// Routes with both tiers at zero are skipped. Invalid limits or duplicate endpoints
    /// fail the whole build so the proxy never starts half-configured.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn from_config(limiters: &[LimiterConfig], metrics: Option<Arc<Metrics>>) -> Result<Self> {
        let mut seen = AHashSet::new();
        for limiter in limiters {
            if !seen.insert(limiter.endpoint.as_str()) {
                return Err(ProxyError::Config(format!(
                    "Duplicate limiter endpoint: {}",
                    limiter.endpoint
                )));
            }
            limiter
                .rate_config
                .validate()
                .map_err(|e| ProxyError::Config(format!("Limiter {}: {e}", limiter.endpoint)))?;
        }

        let mut groups = AHashMap::new();
        for limiter in limiters {
            if !limiter.rate_config.is_limited() {
                debug!(route = %limiter.endpoint, "No limits configured, route bypasses limiting");
                continue;
            }
            let group = LimiterGroup::start(
                limiter.endpoint.clone(),
                limiter.rate_config.clone(),
                metrics.clone(),
            );
            groups.insert(limiter.endpoint.clone(), group);
        }

        Ok(Self { groups })
    }

    /// Group registered for `route`, if any.
    pub fn group(&self, route: &str) -> Option<&Arc<LimiterGroup>> {
        self.groups.get(route)
    }

    /// Metric label for `route`: the route itself when registered, otherwise
    /// [`UNLIMITED_ROUTE_LABEL`] so client-chosen paths cannot grow label cardinality.
    pub fn route_label<'a>(&'a self, route: &str) -> &'a str {
        self.groups
            .get_key_value(route)
            .map_or(UNLIMITED_ROUTE_LABEL, |(name, _)| name.as_str())
    }

    pub fn routes(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
