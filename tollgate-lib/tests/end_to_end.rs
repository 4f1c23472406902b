use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tollgate_lib::config::parse;
use tollgate_lib::security::LimiterRegistry;

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Upstream stand-in that echoes what it received and counts requests
struct Upstream {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

async fn start_upstream() -> Result<Upstream, std::io::Error> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let svc = service_fn(move |req: Request<Incoming>| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let header = |name: &str| {
                        req.headers()
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("-")
                            .to_string()
                    };
                    let echo = format!(
                        "{}|{}|{}",
                        req.uri(),
                        header("host"),
                        header("x-forwarded-for")
                    );
                    async move { Ok::<_, Infallible>(Response::new(Full::new(Bytes::from(echo)))) }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    Ok(Upstream { addr, hits })
}

struct Proxy {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<tollgate_lib::Result<()>>,
}

impl Proxy {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(mut self) -> TestResult {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await??;
        Ok(())
    }
}

async fn start_proxy(config_toml: &str) -> Result<Proxy, Box<dyn std::error::Error + Send + Sync>> {
    let config = Arc::new(parse(config_toml)?);
    let registry = Arc::new(LimiterRegistry::from_config(&config.limiters, None)?);
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(tollgate_lib::serve(listener, config, registry, None, async move {
        let _ = rx.await;
    }));

    Ok(Proxy { addr, shutdown: Some(tx), handle })
}

fn limited_config(upstream: SocketAddr) -> String {
    format!(
        r#"
upstream = "http://{upstream}"

[timeout]
shutdown_secs = 1

[[limiters]]
endpoint = "/api"
rate_config = {{ rate_limit = 0.03333, burst = 2, client_rate_limit = 0.0 }}

[[limiters]]
endpoint = "/users"
rate_config = {{ client_rate_limit = 0.001, client_burst = 1 }}

[[limiters]]
endpoint = "/pub"
rate_config = {{ rate_limit = 0.0, client_rate_limit = 0.0 }}
"#
    )
}

#[tokio::test]
async fn test_route_limit_passes_burst_then_503() -> TestResult {
    let upstream = start_upstream().await?;
    let proxy = start_proxy(&limited_config(upstream.addr)).await?;
    let client = reqwest::Client::new();

    let mut statuses = Vec::new();
    for _ in 0..3 {
        statuses.push(client.get(proxy.url("/api/x")).send().await?.status().as_u16());
    }

    assert_eq!(statuses, vec![200, 200, 503]);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 2);

    let denied = client.get(proxy.url("/api/x")).send().await?;
    assert_eq!(denied.status().as_u16(), 503);
    assert_eq!(denied.text().await?, "Service Unavailable");

    proxy.stop().await
}

#[tokio::test]
async fn test_unregistered_route_always_reaches_upstream() -> TestResult {
    let upstream = start_upstream().await?;
    let proxy = start_proxy(&limited_config(upstream.addr)).await?;
    let client = reqwest::Client::new();

    for _ in 0..10 {
        let status = client.get(proxy.url("/pub/file")).send().await?.status();
        assert_eq!(status.as_u16(), 200);
    }
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 10);

    proxy.stop().await
}

#[tokio::test]
async fn test_client_limit_answers_429() -> TestResult {
    let upstream = start_upstream().await?;
    let proxy = start_proxy(&limited_config(upstream.addr)).await?;
    let client = reqwest::Client::new();

    assert_eq!(client.get(proxy.url("/users/1")).send().await?.status().as_u16(), 200);
    let denied = client.get(proxy.url("/users/2")).send().await?;
    assert_eq!(denied.status().as_u16(), 429);
    assert_eq!(denied.text().await?, "Too Many Requests");
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);

    proxy.stop().await
}

#[tokio::test]
async fn test_request_is_rewritten_for_upstream() -> TestResult {
    let upstream = start_upstream().await?;
    let proxy = start_proxy(&limited_config(upstream.addr)).await?;
    let client = reqwest::Client::new();

    let body = client
        .get(proxy.url("/pub/a/b?q=1"))
        .send()
        .await?
        .text()
        .await?;

    let parts: Vec<&str> = body.split('|').collect();
    assert_eq!(parts, vec!["/pub/a/b?q=1", upstream.addr.to_string().as_str(), "127.0.0.1"]);

    proxy.stop().await
}

#[tokio::test]
async fn test_unreachable_upstream_answers_502() -> TestResult {
    // Reserve a port, then free it so nothing listens there
    let unused = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;

    let proxy = start_proxy(&limited_config(unused)).await?;
    let client = reqwest::Client::new();

    let resp = client.get(proxy.url("/pub/x")).send().await?;
    assert_eq!(resp.status().as_u16(), 502);
    assert_eq!(resp.text().await?, "Bad Gateway");

    proxy.stop().await
}

#[tokio::test]
async fn test_shutdown_without_connections_returns() -> TestResult {
    let upstream = start_upstream().await?;
    let proxy = start_proxy(&limited_config(upstream.addr)).await?;
    proxy.stop().await
}
