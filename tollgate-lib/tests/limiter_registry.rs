use tollgate_lib::config::{LimiterConfig, RateConfig};
use tollgate_lib::security::{LimiterRegistry, UNLIMITED_ROUTE_LABEL};

fn limiter(endpoint: &str, rate_limit: f64, client_rate_limit: f64) -> LimiterConfig {
    LimiterConfig {
        endpoint: endpoint.to_string(),
        rate_config: RateConfig { rate_limit, client_rate_limit, ..RateConfig::default() },
    }
}

#[tokio::test]
async fn test_registers_only_limited_routes(
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = LimiterRegistry::from_config(
        &[
            limiter("/api", 10.0, 0.0),
            limiter("/users", 0.0, 1.0),
            limiter("/pub", 0.0, 0.0),
        ],
        None,
    )?;

    assert_eq!(registry.len(), 2);
    assert!(registry.group("/api").is_some());
    assert!(registry.group("/users").is_some());
    assert!(registry.group("/pub").is_none());

    let mut routes: Vec<_> = registry.routes().collect();
    routes.sort_unstable();
    assert_eq!(routes, vec!["/api", "/users"]);
    Ok(())
}

#[tokio::test]
async fn test_disabled_route_is_still_registered(
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = limiter("/api", 1.0, 1.0);
    config.rate_config.enabled = false;

    let registry = LimiterRegistry::from_config(&[config], None)?;
    let group = registry.group("/api").ok_or("group missing")?;
    assert!(!group.config().enabled);
    Ok(())
}

#[tokio::test]
async fn test_empty_config_yields_empty_registry(
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = LimiterRegistry::from_config(&[], None)?;
    assert!(registry.is_empty());
    assert!(registry.group("/").is_none());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_endpoint_is_rejected() {
    let result = LimiterRegistry::from_config(
        &[limiter("/api", 0.0, 0.0), limiter("/api", 1.0, 0.0)],
        None,
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_invalid_limits_are_rejected() {
    assert!(LimiterRegistry::from_config(&[limiter("/api", -1.0, 0.0)], None).is_err());
    assert!(LimiterRegistry::from_config(&[limiter("/api", 0.0, f64::NAN)], None).is_err());

    let mut zero_burst = limiter("/api", 5.0, 0.0);
    zero_burst.rate_config.burst = Some(0);
    assert!(LimiterRegistry::from_config(&[zero_burst], None).is_err());
}

#[tokio::test]
async fn test_route_label_collapses_unregistered_routes(
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let registry = LimiterRegistry::from_config(
        &[limiter("/api", 10.0, 0.0), limiter("/pub", 0.0, 0.0)],
        None,
    )?;

    assert_eq!(registry.route_label("/api"), "/api");
    assert_eq!(registry.route_label("/pub"), UNLIMITED_ROUTE_LABEL);
    assert_eq!(registry.route_label("/random/a8f3"), UNLIMITED_ROUTE_LABEL);
    assert_eq!(registry.route_label("/random/b771"), "unlimited");
    Ok(())
}
