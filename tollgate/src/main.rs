#![forbid(unsafe_code)]

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tollgate_lib::config::{load_from_path, validate, Config};
use tollgate_lib::telemetry::{init_metrics, init_tracing, start_observability_server, Metrics};
use tollgate_lib::LimiterRegistry;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Tollgate rate-limiting reverse proxy")]
struct Cli {
    /// Path to configuration TOML file
    #[arg(short, long, value_name = "FILE", env = "TOLLGATE_CONFIG")]
    config: PathBuf,

    /// Address to listen on, overrides `listen` from the file
    #[arg(long, value_name = "ADDR", env = "TOLLGATE_LISTEN")]
    listen: Option<SocketAddr>,

    /// Upstream base URL, overrides `upstream` from the file
    #[arg(long, value_name = "URL", env = "TOLLGATE_UPSTREAM")]
    upstream: Option<String>,
}

fn load_config(cli: &Cli) -> tollgate_lib::Result<Config> {
    let mut config = load_from_path(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(upstream) = &cli.upstream {
        config.upstream = upstream.clone();
    }
    // Overrides are checked the same way as the file
    validate(&config)?;
    Ok(config)
}

fn start_metrics(config: &Config) -> Option<Arc<Metrics>> {
    let port = config.telemetry.metrics_port?;
    match init_metrics() {
        Ok((metrics, registry)) => {
            let upstream: Arc<str> = Arc::from(config.upstream.as_str());
            tokio::spawn(async move {
                if let Err(err) = start_observability_server(port, registry, upstream).await {
                    error!(%err, "observability server exited with error");
                }
            });
            Some(metrics)
        }
        Err(err) => {
            warn!(%err, "failed to initialize metrics, continuing without them");
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = init_tracing(&config.logging, &config.telemetry) {
        eprintln!("failed to initialize tracing: {err}");
        return ExitCode::FAILURE;
    }

    info!(
        listen = %config.listen,
        upstream = %config.upstream,
        limiters = config.limiters.len(),
        "configuration loaded"
    );

    let metrics = start_metrics(&config);

    let registry = match LimiterRegistry::from_config(&config.limiters, metrics.clone()) {
        Ok(registry) => Arc::new(registry),
        Err(err) => {
            error!(%err, "failed to build limiter registry");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = tollgate_lib::run(Arc::new(config), registry, metrics).await {
        error!(%err, "proxy exited with error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
