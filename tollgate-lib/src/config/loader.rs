use std::collections::HashSet;
use std::fs;
use std::path::Path;

use http::Uri;

use crate::config::Config;
use crate::error::{ProxyError, Result};

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Config> {
    let txt = fs::read_to_string(p)
        .map_err(|e| ProxyError::Config(format!("Failed to read config file: {e}")))?;
    parse(&txt)
}

/// Parse and validate a TOML configuration document.
pub fn parse(txt: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(txt)
        .map_err(|e| ProxyError::Config(format!("Failed to parse config: {e}")))?;

    validate(&cfg)?;

    Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
    validate_upstream(&cfg.upstream)?;

    if let Some(header) = &cfg.client_ip_header {
        http::HeaderName::from_bytes(header.as_bytes()).map_err(|e| {
            ProxyError::Config(format!("Invalid client_ip_header '{header}': {e}"))
        })?;
    }

    if cfg.timeout.connect_ms == 0 {
        return Err(ProxyError::Config("connect_ms must be > 0".into()));
    }

    let mut endpoints = HashSet::new();
    for limiter in &cfg.limiters {
        if !limiter.endpoint.starts_with('/') {
            return Err(ProxyError::Config(format!(
                "Limiter endpoint must start with '/': {}",
                limiter.endpoint
            )));
        }
        if !endpoints.insert(limiter.endpoint.as_str()) {
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

    Ok(())
}

fn validate_upstream(upstream: &str) -> Result<()> {
    if upstream.trim().is_empty() {
        return Err(ProxyError::Config("upstream is not set".into()));
    }
    let uri: Uri = upstream
        .parse()
        .map_err(|e| ProxyError::Config(format!("Invalid upstream '{upstream}': {e}")))?;
    if uri.scheme_str() != Some("http") {
        return Err(ProxyError::Config(format!(
            "Upstream must use the http scheme: {upstream}"
        )));
    }
    if uri.authority().is_none() {
        return Err(ProxyError::Config(format!("Upstream has no host: {upstream}")));
    }
    Ok(())
}
