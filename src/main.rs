use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, info, warn};

use routegate::config::{AppConfig, OnLimit, StoreBackend};
use routegate::ratelimit::{
    CounterStore, LimitCallback, MemoryStore, PassThrough, RateLimitState, RateLimiter,
    RedisStore, RouteLimits,
};
use routegate::server::{default_routes, HttpServer};
use routegate::telemetry;

const PURGE_INTERVAL: Duration = Duration::from_secs(30);

/// Per-route rate limited HTTP service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Redis URL, overriding the configuration
    #[arg(long)]
    redis_url: Option<String>,

    /// Keep counters in process memory instead of Redis
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(url) = args.redis_url {
        config.redis.url = url;
    }
    if args.memory {
        config.rate_limiting.backend = StoreBackend::Memory;
    }

    telemetry::init_tracing(&config.logging)?;

    info!("Starting Routegate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        listen_addr = %config.server.listen_addr,
        backend = ?config.rate_limiting.backend,
        "Configuration loaded"
    );

    let store: Arc<dyn CounterStore> = match config.rate_limiting.backend {
        StoreBackend::Redis => Arc::new(RedisStore::connect(&config.redis.url).await?),
        StoreBackend::Memory => {
            warn!("Using in-memory counters; limits are not shared between instances");
            let store = Arc::new(MemoryStore::new());
            tokio::spawn(purge_expired_counters(store.clone()));
            store
        }
    };

    let callback: Option<Arc<dyn LimitCallback>> = match config.rate_limiting.on_limit {
        OnLimit::Reject => None,
        OnLimit::PassThrough => Some(Arc::new(PassThrough)),
    };

    let rate_limiter =
        Arc::new(RateLimiter::setup(store, &config.rate_limiting.prefix, None, callback).await?);
    info!(prefix = %rate_limiter.prefix(), "Rate limiter initialized");

    let routes = Arc::new(load_routes(&config)?);
    info!(routes = ?routes.routes(), "Route rate limits loaded");

    if let Some(path) = config.rate_limiting.rules_path.clone() {
        let interval = Duration::from_secs(config.rate_limiting.reload_interval_secs);
        tokio::spawn(reload_routes(routes.clone(), path, interval));
    }

    let server = HttpServer::new(
        config.server.listen_addr,
        RateLimitState::new(rate_limiter, routes),
    );
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Routegate stopped");
    Ok(())
}

/// Rules from the configured file, completed with the built-in ones.
fn load_routes(config: &AppConfig) -> routegate::error::Result<RouteLimits> {
    let routes = match &config.rate_limiting.rules_path {
        Some(path) => RouteLimits::from_file(path)?,
        None => RouteLimits::new(),
    };
    routes.merge_missing(&default_routes());
    Ok(routes)
}

/// Periodically re-read the rules file. A bad file keeps the current table.
async fn reload_routes(routes: Arc<RouteLimits>, path: PathBuf, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // First tick fires immediately; the table was just loaded.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match RouteLimits::from_file(&path) {
            Ok(reloaded) => {
                reloaded.merge_missing(&default_routes());
                routes.replace(reloaded);
                info!(routes = routes.len(), "Route rate limits reloaded");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to reload route rate limits");
            }
        }
    }
}

async fn purge_expired_counters(store: Arc<MemoryStore>) {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        ticker.tick().await;
        let purged = store.purge_expired();
        if purged > 0 {
            debug!(purged = purged, remaining = store.len(), "Purged expired counters");
        }
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
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
