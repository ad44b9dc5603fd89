//! Fitness Cache - caching and rate limiting for the fitness API
//!
//! Serves the health and cache admin API over the configured backend.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::{signal, task::JoinHandle};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fitness_cache::{create_router, spawn_expiry_sweeper, AppState, Config, Connections};

/// # Startup Sequence
/// 1. Initialize tracing subscriber
/// 2. Load configuration from environment variables
/// 3. Open the named store connections
/// 4. Start expiry sweepers (memory backend only)
/// 5. Serve until SIGINT/SIGTERM, then close every connection
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info", overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fitness_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Fitness Cache Server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: backend={:?}, redis={}:{}, default_ttl={}s, port={}",
        config.backend,
        config.redis.host,
        config.redis.port,
        config.default_ttl,
        config.server_port
    );

    let connections = Arc::new(
        Connections::connect(config.backend, &config.redis)
            .await
            .context("failed to open store connections")?,
    );
    info!("Store connections ready");

    let sweepers: Vec<JoinHandle<()>> = connections
        .memory_stores()
        .iter()
        .map(|store| spawn_expiry_sweeper(store.clone(), config.sweep_interval))
        .collect();

    let state = AppState::new(connections.clone(), &config).context("invalid configuration")?;
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    for sweeper in sweepers {
        sweeper.abort();
    }
    connections.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
