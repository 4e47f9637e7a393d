//! jeapcached - in-memory memcached-protocol cache
//!
//! Serves stdin/stdout by default, or TCP when a listen address is configured.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use jeapcached::config::Config;
use jeapcached::health::HealthServer;
use jeapcached::metrics::Metrics;
use jeapcached::scheduler::{DispatchTable, Scheduler};
use jeapcached::server::Server;
use jeapcached::storage::CacheStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // stdout may carry the protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting jeapcached");

    let config = if let Some(config_path) = std::env::args().nth(1) {
        info!("Loading configuration from {}", config_path);
        Config::from_file(&config_path)?
    } else {
        info!("Using default configuration (set JEAPCACHED_* env vars to customize)");
        Config::from_env()?
    };

    info!("Configuration: {:?}", config);

    if config.server.timeout_secs > 0 {
        start_alarm(Duration::from_secs(config.server.timeout_secs))?;
    }

    let runtime = Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(async_main(config));
    // a pending stdin read would otherwise hold the runtime open
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

/// Kill the whole process once `after` has elapsed
fn start_alarm(after: Duration) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("alarm".to_string())
        .spawn(move || {
            std::thread::sleep(after);
            error!(secs = after.as_secs(), "Alarm expired, aborting");
            std::process::exit(1);
        })?;
    Ok(())
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    let cancel_token = CancellationToken::new();

    let store = Arc::new(CacheStore::new(config.store.buckets));
    let metrics = Arc::new(Metrics::new());
    let scheduler = Arc::new(Scheduler::new(
        &config.scheduler,
        config.store.max_value_length,
        Arc::clone(&store),
        DispatchTable::new(&config.store),
        Arc::clone(&metrics),
    )?);
    info!(
        buckets = store.buckets(),
        workers = scheduler.workers(),
        "Cache initialized"
    );

    let health_server = if config.metrics.enabled {
        let health = Arc::new(HealthServer::new(Arc::clone(&metrics), Arc::clone(&store)));
        let health_clone = Arc::clone(&health);
        let metrics_config = config.metrics.clone();

        std::thread::spawn(move || {
            if let Err(e) = health_clone.run(&metrics_config) {
                error!("Health server error: {}", e);
            }
        });

        Some(health)
    } else {
        None
    };

    let server = Arc::new(Server::new(
        config.server.clone(),
        Arc::clone(&scheduler),
        cancel_token.clone(),
    ));

    if let Some(ref health) = health_server {
        health.set_ready(true);
        info!("Server is ready");
    }

    let cancel_for_signal = cancel_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
            }
            _ = terminate() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
        cancel_for_signal.cancel();
    });

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
    }

    if let Some(health) = health_server {
        health.set_ready(false);
        health.stop();
    }

    let stats = scheduler.stats();
    // workers may be parked in blocking calls; join them off the runtime
    tokio::task::spawn_blocking(move || scheduler.shutdown()).await?;

    info!(
        submitted = stats.submitted,
        completed = stats.completed,
        purged = store.purged(),
        "jeapcached stopped"
    );
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}
