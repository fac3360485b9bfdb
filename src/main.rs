use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hookgate::config::{HookgateConfig, LogFormat};
use hookgate::http::{AppState, HttpServer};
use hookgate::ratelimit::RateLimiter;
use hookgate::relay::RelayClient;
use hookgate::sweeper::Sweeper;
use hookgate::webhooks::MemoryUserDirectory;

/// Webhook ingestion service with a per-identifier daily rate limit.
#[derive(Parser, Debug)]
#[command(name = "hookgate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Override the daily request limit
    #[arg(long)]
    daily_limit: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = HookgateConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    if let Some(limit) = args.daily_limit {
        config.rate_limiting.daily_limit = limit;
    }
    config.validate()?;

    init_tracing(config.logging.format);

    info!("Starting Hookgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %config.server.http_addr,
        daily_limit = config.rate_limiting.daily_limit,
        retention_days = config.rate_limiting.retention_days,
        "Configuration loaded"
    );

    let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limiting));
    let sweeper = Sweeper::new(rate_limiter.clone(), config.rate_limiting.sweep_interval()).spawn();

    let relay = RelayClient::from_config(&config.relay)?;
    match relay.as_ref() {
        Some(client) => info!(status_url = %client.status_url(), "Relay route enabled"),
        None => info!("Relay route disabled, no status URL configured"),
    }
    let state = Arc::new(
        AppState::new(
            rate_limiter,
            Arc::new(MemoryUserDirectory::new()),
            config.webhooks.clone(),
        )
        .with_relay(relay),
    );

    HttpServer::new(config.server.http_addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    sweeper.stop().await;

    info!("Hookgate stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Plain => registry
            .with(fmt::layer().with_target(false).with_thread_ids(true))
            .init(),
    }
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
