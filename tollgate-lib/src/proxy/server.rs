use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use http::header::HeaderName;
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::proxy::connection::ConnectionManager;
use crate::proxy::forwarding::UpstreamForwarder;
use crate::proxy::handler::{ProxyService, RateLimitMiddleware};
use crate::security::{route_key, ClientAddr, LimiterRegistry};
use crate::telemetry::Metrics;

/// Bind `config.listen` and serve until SIGTERM or SIGINT.
pub async fn run(
    config: Arc<Config>,
    registry: Arc<LimiterRegistry>,
    metrics: Option<Arc<Metrics>>,
) -> Result<()> {
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(ProxyError::Io)?;

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        ProxyError::Io(std::io::Error::other(format!("Failed to setup SIGTERM handler: {e}")))
    })?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).map_err(|e| {
        ProxyError::Io(std::io::Error::other(format!("Failed to setup SIGINT handler: {e}")))
    })?;

    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        }
    };

    serve(listener, config, registry, metrics, shutdown).await
}

/// Serve connections from `listener` until `shutdown` resolves, then drain.
///
/// Every request passes through the rate limiter before reaching the upstream.
pub async fn serve<F>(
    listener: TcpListener,
    config: Arc<Config>,
    registry: Arc<LimiterRegistry>,
    metrics: Option<Arc<Metrics>>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let addr = listener.local_addr().map_err(ProxyError::Io)?;

    let client_ip_header = config
        .client_ip_header
        .as_deref()
        .map(HeaderName::from_str)
        .transpose()
        .map_err(|e| ProxyError::Config(format!("Invalid client_ip_header: {e}")))?;

    let forwarder = Arc::new(UpstreamForwarder::new(
        &config.upstream,
        &config.timeout,
        metrics.clone(),
    )?);
    let service = RateLimitMiddleware::new(
        ProxyService::new(forwarder, metrics.clone()),
        Arc::clone(&registry),
        client_ip_header,
        metrics.clone(),
    );

    let mut builder = ConnBuilder::new(TokioExecutor::new());
    builder
        .http1()
        .keep_alive(config.timeout.keep_alive.enabled);

    let connections = ConnectionManager::new();

    info!(
        ?addr,
        upstream = %config.upstream,
        limited_routes = registry.len(),
        "Starting rate-limiting proxy (h1/h2)"
    );

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                connections.begin_shutdown();
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                let guard = match connections.try_accept(metrics.as_ref()) {
                    Ok(guard) => guard,
                    Err(e) => {
                        info!(?peer, error = %e, "Rejecting connection");
                        continue;
                    }
                };

                let builder = builder.clone();
                let service = service.clone();
                let metrics = metrics.clone();
                let registry = Arc::clone(&registry);

                tokio::spawn(async move {
                    // Ensure counter is decremented when connection finishes
                    let _guard = guard;
                    let svc = hyper::service::service_fn(move |mut req: Request<Incoming>| {
                        req.extensions_mut().insert(ClientAddr(peer));
                        let start = Instant::now();
                        let method = req.method().to_string();
                        let route =
                            registry.route_label(&route_key(req.uri().path())).to_string();
                        let metrics = metrics.clone();
                        let fut = service.call(req);
                        async move {
                            let resp = fut.await;
                            if let (Some(m), Ok(resp)) = (&metrics, &resp) {
                                let status = resp.status().as_u16();
                                m.record_request(&method, status, &route);
                                m.record_request_duration(
                                    start.elapsed().as_secs_f64(),
                                    &method,
                                    status,
                                    &route,
                                );
                            }
                            resp
                        }
                    });

                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "serve_connection error");
                    }
                });
            }
        }
    }

    connections
        .drain(Duration::from_secs(config.timeout.shutdown_secs))
        .await;

    info!("Proxy server stopped");
    Ok(())
}
