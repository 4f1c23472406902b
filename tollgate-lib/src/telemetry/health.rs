use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use hyper::StatusCode;
use serde_json::{json, Value};

use crate::error::{ProxyError, Result};

pub type RespBody = BoxBody<Bytes, hyper::Error>;

fn json_response(status: StatusCode, body: &Value) -> Result<Response<RespBody>> {
    let body_bytes = serde_json::to_vec(body)
        .map_err(|e| ProxyError::Http(format!("Failed to serialize response: {e}")))?;

    let body = Full::new(Bytes::from(body_bytes))
        .map_err(|never| match never {})
        .boxed();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(body)
        .map_err(|e| ProxyError::Http(format!("Failed to build response: {e}")))
}

/// Health check response - always returns 200 if process is running
pub fn health_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({"status": "healthy"}))
}

/// Readiness check - 200 with the upstream being proxied to
///
/// Startup validation guarantees an upstream, so once this server answers the proxy is
/// ready.
pub fn ready_check_response(upstream: &str) -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({"status": "ready", "upstream": upstream}))
}

/// Liveness check - always returns 200 if process is running
pub fn live_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({"status": "alive"}))
}
