use http::{Request, Response};
use hyper::body::Incoming;
use hyper::service::Service;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::proxy::forwarding::UpstreamForwarder;
use crate::proxy::synthetic_response::RespBody;
use crate::telemetry::Metrics;

/// Forward one admitted request, turning forwarding failures into synthetic responses.
pub async fn handle_proxy_request(
    req: Request<Incoming>,
    forwarder: &UpstreamForwarder,
    metrics: Option<&Arc<Metrics>>,
) -> Response<RespBody> {
    match forwarder.forward(req).await {
        Ok(resp) => resp,
        Err(e) => {
            if let Some(m) = metrics {
                m.record_error(e.error_type());
            }
            Response::from(e)
        }
    }
}

/// Terminal service of the pipeline: sends requests to the upstream.
#[derive(Clone)]
pub struct ProxyService {
    forwarder: Arc<UpstreamForwarder>,
    metrics: Option<Arc<Metrics>>,
}

impl ProxyService {
    pub fn new(forwarder: Arc<UpstreamForwarder>, metrics: Option<Arc<Metrics>>) -> Self {
        Self { forwarder, metrics }
    }
}

impl Service<Request<Incoming>> for ProxyService {
    type Response = Response<RespBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let forwarder = Arc::clone(&self.forwarder);
        let metrics = self.metrics.clone();
        Box::pin(async move { Ok(handle_proxy_request(req, &forwarder, metrics.as_ref()).await) })
    }
}
