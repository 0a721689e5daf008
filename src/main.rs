use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ridegate::audit::{AuditDispatcher, AuditSink, FileAuditSink, TracingAuditSink};
use ridegate::config::{GateConfig, LogFormat, LoggingConfig};
use ridegate::http::{build_router, HttpServer};
use ridegate::ratelimit::{RateLimiter, Sweeper};

/// Per-category rate limiter for the marketplace API.
#[derive(Debug, Parser)]
#[command(name = "ridegate", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the HTTP listen address
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Override the log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = GateConfig::load(cli.config.as_deref())?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    init_tracing(&config.logging);

    info!("Starting Ridegate rate limiting service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        listen_addr = %config.server.listen_addr,
        enabled = config.rate_limiting.enabled,
        sweep_interval_secs = config.rate_limiting.sweep_interval_secs,
        "Configuration loaded"
    );

    let sink: Arc<dyn AuditSink> = match &config.audit.log_path {
        Some(path) => Arc::new(FileAuditSink::open(path).await?),
        None => Arc::new(TracingAuditSink),
    };

    let rate_limiter = Arc::new(
        RateLimiter::new()
            .with_audit(AuditDispatcher::new(sink))
            .enabled(config.rate_limiting.enabled),
    );
    if !config.rate_limiting.enabled {
        warn!("Rate limiting is disabled; all requests will be admitted");
    }
    info!("Rate limiter initialized");

    let sweeper = Sweeper::spawn(rate_limiter.clone(), config.rate_limiting.sweep_interval());

    let router = build_router(rate_limiter, &config);
    let server = HttpServer::new(config.server.listen_addr, router);

    // Run the server with graceful shutdown on Ctrl+C
    let served = server.serve_with_shutdown(shutdown_signal()).await;

    sweeper.shutdown().await;
    served?;

    info!("Ridegate rate limiting service stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
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
