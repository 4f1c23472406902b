use serde::Deserialize;
use std::time::Duration;

/// Cleanup interval applied when a limiter does not set one (minutes)
pub const DEFAULT_CLEANUP_INTERVAL_MINUTES: u64 = 10;

/// Rate limiter attached to one route
#[derive(Debug, Deserialize, Clone)]
pub struct LimiterConfig {
    /// Route the limiter applies to, matched against the directory of the request path
    /// Example: "/api/widgets" limits "/api/widgets/1" and "/api/widgets/2"
    pub endpoint: String,
    /// Limits for this route
    #[serde(default)]
    pub rate_config: RateConfig,
}

/// Two-tier rate limit configuration for a route
///
/// Both tiers are independent: a zero rate switches that tier off. A route with
/// both tiers off is never registered and its requests bypass limiting entirely.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RateConfig {
    /// Master switch for the route
    /// When false the route is registered but every request is admitted
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Route-wide refill rate in requests per second, shared by all clients
    /// Default: 0 (off)
    #[serde(default)]
    pub rate_limit: f64,
    /// Route-wide burst capacity
    /// Default: the route rate rounded up, at least 1
    #[serde(default)]
    pub burst: Option<u32>,
    /// Per-client refill rate in requests per second
    /// Default: 0 (off)
    #[serde(default)]
    pub client_rate_limit: f64,
    /// Per-client burst capacity
    /// Default: the client rate rounded up, at least 1
    #[serde(default)]
    pub client_burst: Option<u32>,
    /// How long an idle client entry is kept, and how often the route is swept (minutes)
    /// Default: 10 (0 also selects the default)
    #[serde(default)]
    pub cleanup_interval_minutes: u64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_limit: 0.0,
            burst: None,
            client_rate_limit: 0.0,
            client_burst: None,
            cleanup_interval_minutes: 0,
        }
    }
}

impl RateConfig {
    /// True when at least one tier is active, i.e. the route needs a limiter group.
    pub fn is_limited(&self) -> bool {
        self.rate_limit > 0.0 || self.client_rate_limit > 0.0
    }

    pub fn route_burst(&self) -> u32 {
        self.burst.unwrap_or_else(|| default_burst(self.rate_limit))
    }

    pub fn client_burst(&self) -> u32 {
        self.client_burst
            .unwrap_or_else(|| default_burst(self.client_rate_limit))
    }

    pub fn cleanup_interval(&self) -> Duration {
        let minutes = if self.cleanup_interval_minutes == 0 {
            DEFAULT_CLEANUP_INTERVAL_MINUTES
        } else {
            self.cleanup_interval_minutes
        };
        Duration::from_secs(minutes.saturating_mul(60))
    }

    /// Reject limits that could never be enforced.
    pub fn validate(&self) -> Result<(), String> {
        check_rate("rate_limit", self.rate_limit)?;
        check_rate("client_rate_limit", self.client_rate_limit)?;
        if self.rate_limit > 0.0 && self.burst == Some(0) {
            return Err("burst must be > 0 when rate_limit is set".into());
        }
        if self.client_rate_limit > 0.0 && self.client_burst == Some(0) {
            return Err("client_burst must be > 0 when client_rate_limit is set".into());
        }
        Ok(())
    }
}

fn check_rate(field: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() {
        return Err(format!("{field} must be a finite number"));
    }
    if value < 0.0 {
        return Err(format!("{field} must be >= 0, got {value}"));
    }
    Ok(())
}

fn default_burst(rate: f64) -> u32 {
    if rate.is_finite() && rate > 1.0 {
        // Saturating float-to-int cast
        rate.ceil() as u32
    } else {
        1
    }
}

fn default_true() -> bool {
    true
}
