use http::StatusCode;
use http_body_util::BodyExt;
use tollgate_lib::telemetry::{init_metrics, route_observability};

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[tokio::test]
async fn test_observability_routes() -> TestResult {
    let (metrics, registry) = init_metrics()?;
    metrics.record_rate_limit_rejection("route", "/api");

    let resp = route_observability("/metrics", &registry, "http://backend:9000");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body().collect().await?.to_bytes();
    let text = String::from_utf8(body.to_vec())?;
    assert!(text.contains("tollgate_build_info"), "metrics output: {text}");

    let resp = route_observability("/health", &registry, "http://backend:9000");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = route_observability("/live", &registry, "http://backend:9000");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = route_observability("/ready", &registry, "http://backend:9000");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.into_body().collect().await?.to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(json["status"], "ready");
    assert_eq!(json["upstream"], "http://backend:9000");

    let resp = route_observability("/nope", &registry, "http://backend:9000");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    Ok(())
}
