use http::header::{self, HeaderValue};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{Request, Response, Uri, Version};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::TimeoutConfig;
use crate::error::{ProxyError, Result};
use crate::proxy::handler::headers::{add_forwarded_headers, strip_hop_by_hop};
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::synthetic_response::RespBody;
use crate::security::ClientAddr;
use crate::telemetry::Metrics;

type HttpClient = Client<HttpConnector, Incoming>;

/// Sends admitted requests to the single configured upstream host.
///
/// One pooled client is shared by every connection.
pub struct UpstreamForwarder {
    scheme: Scheme,
    authority: Authority,
    host_header: HeaderValue,
    base_path: String,
    base_query: Option<String>,
    client: HttpClient,
    metrics: Option<Arc<Metrics>>,
}

impl UpstreamForwarder {
    pub fn new(
        upstream: &str,
        timeout: &TimeoutConfig,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self> {
        let uri: Uri = upstream.parse()?;
        let scheme = uri
            .scheme()
            .cloned()
            .ok_or_else(|| ProxyError::Config(format!("Upstream {upstream} has no scheme")))?;
        if scheme != Scheme::HTTP {
            return Err(ProxyError::Config(format!(
                "Upstream {upstream} must use http, got {scheme}"
            )));
        }
        let authority = uri
            .authority()
            .cloned()
            .ok_or_else(|| ProxyError::Config(format!("Upstream {upstream} has no host")))?;
        let host_header = HeaderValue::from_str(authority.as_str())
            .map_err(|e| ProxyError::Config(format!("Upstream host is not a valid header: {e}")))?;

        Ok(Self {
            scheme,
            authority,
            host_header,
            base_path: uri.path().to_string(),
            base_query: uri.query().map(str::to_string),
            client: create_client(timeout),
            metrics,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Rewrite `uri` onto the upstream: paths joined with a single slash, queries merged.
    pub fn upstream_uri(&self, uri: &Uri) -> HttpResult<Uri> {
        let path = single_joining_slash(&self.base_path, uri.path());
        let query = match (self.base_query.as_deref(), uri.query()) {
            (Some(base), Some(req)) if !base.is_empty() => Some(format!("{base}&{req}")),
            (Some(base), None) => Some(base.to_string()),
            (_, req) => req.map(str::to_string),
        };
        let path_and_query = match query {
            Some(q) => format!("{path}?{q}"),
            None => path,
        };
        let path_and_query = PathAndQuery::try_from(path_and_query)
            .map_err(|e| HttpError::InvalidUri(e.to_string()))?;

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| HttpError::InvalidUri(e.to_string()))
    }

    /// Forward one request and hand back the upstream response.
    ///
    /// Transport failures become [`HttpError::UpstreamUnavailable`] (502).
    pub async fn forward(&self, mut req: Request<Incoming>) -> HttpResult<Response<RespBody>> {
        let client = req.extensions().get::<ClientAddr>().map(|ClientAddr(peer)| peer.ip());
        let uri = self.upstream_uri(req.uri())?;

        debug!(
            "{} {} from {} redirected to {}",
            req.method(),
            req.uri().path(),
            client.map_or_else(|| "unknown".to_string(), |ip| ip.to_string()),
            self.authority
        );

        let headers = req.headers_mut();
        strip_hop_by_hop(headers);
        if let Some(ip) = client {
            add_forwarded_headers(headers, ip);
        }
        headers.insert(header::HOST, self.host_header.clone());

        *req.uri_mut() = uri;
        *req.version_mut() = Version::HTTP_11;

        let start = Instant::now();
        let result = self.client.request(req).await;
        let duration = start.elapsed().as_secs_f64();

        match result {
            Ok(resp) => {
                if let Some(ref m) = self.metrics {
                    m.record_upstream_request(resp.status().as_u16(), duration);
                }
                let (mut parts, body) = resp.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Ok(Response::from_parts(parts, body.boxed()))
            }
            Err(e) => {
                warn!(upstream = %self.authority, error = %e, "Upstream request failed");
                if let Some(ref m) = self.metrics {
                    m.record_upstream_error();
                }
                Err(HttpError::UpstreamUnavailable(e.to_string()))
            }
        }
    }
}

pub fn create_client(timeout: &TimeoutConfig) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_millis(timeout.connect_ms)));
    // This sets the TCP keep-alive timeout for idle connections
    if timeout.keep_alive.enabled {
        connector.set_keepalive(Some(Duration::from_secs(timeout.keep_alive.timeout_secs)));
    } else {
        connector.set_keepalive(None);
    }

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_millis(timeout.idle_ms))
        .build(connector)
}

/// Join two URL paths with exactly one slash between them.
pub fn single_joining_slash(a: &str, b: &str) -> String {
    match (a.ends_with('/'), b.starts_with('/')) {
        (true, true) => format!("{a}{}", &b[1..]),
        (false, false) => format!("{a}/{b}"),
        _ => format!("{a}{b}"),
    }
}
