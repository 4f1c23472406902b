use http::header::HeaderName;
use http::{Request, Response};
use hyper::service::Service;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::synthetic_response::RespBody;
use crate::security::rate_limit::LimitTier;
use crate::security::{extract_client_key, route_key, LimiterRegistry};
use crate::telemetry::Metrics;

/// Decide whether a request may proceed past the limiter of its route.
///
/// Checks run in a fixed order: group lookup, `enabled`, client key, client tier, route
/// tier. A request denied by the client tier never consumes route budget.
pub fn check_rate_limit<B>(
    registry: &LimiterRegistry,
    req: &Request<B>,
    client_ip_header: Option<&HeaderName>,
    metrics: Option<&Arc<Metrics>>,
) -> HttpResult<()> {
    let route = route_key(req.uri().path());
    let Some(group) = registry.group(&route) else {
        return Ok(());
    };

    let config = group.config();
    if !config.enabled {
        debug!(route = %route, "Limiter disabled, admitting request");
        return Ok(());
    }

    let client = extract_client_key(req, client_ip_header).map_err(|e| {
        error!(route = %route, error = %e, "Failed to extract client key");
        if let Some(m) = metrics {
            m.record_client_key_error(&route);
        }
        HttpError::ClientKey(e.to_string())
    })?;

    if let Some(m) = metrics {
        m.record_rate_limit_request(&route);
    }

    if config.client_rate_limit > 0.0 {
        let entry = group.client_entry(client);
        if !entry.bucket().allow() {
            info!(
                route = %route,
                client = %client,
                tier = LimitTier::Client.as_str(),
                "Request denied"
            );
            if let Some(m) = metrics {
                m.record_rate_limit_rejection(LimitTier::Client.as_str(), &route);
            }
            return Err(HttpError::TooManyRequests { route });
        }
    }

    if let Some(bucket) = group.route_bucket() {
        if !bucket.allow() {
            info!(
                route = %route,
                client = %client,
                tier = LimitTier::Route.as_str(),
                "Request denied"
            );
            if let Some(m) = metrics {
                m.record_rate_limit_rejection(LimitTier::Route.as_str(), &route);
            }
            return Err(HttpError::RouteOverloaded { route });
        }
    }

    if let Some(m) = metrics {
        m.record_rate_limit_allowed(&route);
    }
    Ok(())
}

/// Pipeline stage that applies [`check_rate_limit`] before handing a request to `inner`.
///
/// Denied requests are answered with a synthetic response and never reach `inner`.
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    registry: Arc<LimiterRegistry>,
    client_ip_header: Option<HeaderName>,
    metrics: Option<Arc<Metrics>>,
}

impl<S> RateLimitMiddleware<S> {
    pub fn new(
        inner: S,
        registry: Arc<LimiterRegistry>,
        client_ip_header: Option<HeaderName>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self { inner, registry, client_ip_header, metrics }
    }

    pub fn registry(&self) -> &Arc<LimiterRegistry> {
        &self.registry
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S, B> Service<Request<B>> for RateLimitMiddleware<S>
where
    S: Service<Request<B>, Response = Response<RespBody>>,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response<RespBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        match check_rate_limit(
            &self.registry,
            &req,
            self.client_ip_header.as_ref(),
            self.metrics.as_ref(),
        ) {
            Ok(()) => Box::pin(self.inner.call(req)),
            Err(e) => {
                let resp = Response::from(e);
                Box::pin(async move { Ok(resp) })
            }
        }
    }
}
