use serde::Deserialize;
use std::net::SocketAddr;

use super::limiter::LimiterConfig;
use super::telemetry::{LoggingConfig, TelemetryConfig};
use super::timeout::TimeoutConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address and port to listen on
    /// Example: "0.0.0.0:8080" or "127.0.0.1:8080"
    /// Default: "0.0.0.0:8080"
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Upstream host every admitted request is forwarded to
    /// Must be a plain HTTP URL, optionally with a base path
    /// Example: "http://backend:9000" or "http://10.0.0.5:8080/v2"
    pub upstream: String,
    /// Request header carrying the client address when running behind another proxy
    /// The last comma-separated entry (the one appended by that proxy) is the client key
    /// When absent from a request, the peer address is used instead
    /// Default: None (always use the peer address)
    #[serde(default)]
    pub client_ip_header: Option<String>,
    /// Per-route rate limiters
    /// Routes whose limits are both zero are ignored
    #[serde(default)]
    pub limiters: Vec<LimiterConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Timeout configuration
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// Telemetry configuration
    /// Controls metrics and health endpoints
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
