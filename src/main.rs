use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber;

use tollgate::config::{Backend, TollgateConfig};
use tollgate::http::{rate_limit, HttpServer, RateLimitState};
use tollgate::ratelimit::{
    InMemoryContainer, RateLimiterContainer, RedisContainer, StrategyFactory, TokenBucketFactory,
};

#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about = "Per-client HTTP rate limiting service")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    info!("Starting Tollgate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            TollgateConfig::from_file(path).with_context(|| format!("loading config from {path}"))?
        }
        None => TollgateConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(
        listen_addr = %config.server.listen_addr,
        capacity = config.rate_limiting.capacity,
        window_secs = config.rate_limiting.window_secs,
        backend = ?config.rate_limiting.backend,
        "Configuration loaded"
    );

    let factory: Arc<dyn StrategyFactory> = Arc::new(TokenBucketFactory::new(
        config.rate_limiting.capacity,
        config.rate_limiting.window(),
    ));

    let container: Arc<dyn RateLimiterContainer> = match config.rate_limiting.backend {
        Backend::Memory => Arc::new(InMemoryContainer::new()),
        Backend::Redis => {
            let redis = config
                .rate_limiting
                .redis
                .as_ref()
                .context("redis backend selected but no redis settings configured")?;
            let container = RedisContainer::connect(&redis.url(), Arc::clone(&factory))
                .await
                .context("connecting to redis")?;
            info!(host = %redis.host, port = redis.port, "Connected to Redis");
            Arc::new(container)
        }
    };

    let state = RateLimitState::new(container, factory);
    let app = Router::new()
        .route("/", get(|| async { "OK" }))
        .layer(axum::middleware::from_fn_with_state(state, rate_limit));

    let server = HttpServer::new(config.server.listen_addr, app);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Tollgate Rate Limiting Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
