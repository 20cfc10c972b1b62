//! Hypercache node
//!
//! Serves the cache boundary routes for a primary or secondary node.

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hypercache::{create_app, spawn_cleanup_task, AppState, CacheRouter, Config, Role};

/// Main entry point for a Hypercache node.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Build the role-specific router (opens SQLite on a primary)
/// 4. Start the periodic expiry sweep if configured
/// 5. Serve the API under the configured path
/// 6. On SIGINT/SIGTERM, stop serving and drain pending replication requests
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hypercache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hypercache node");

    let config = Config::from_env().context("failed to load configuration")?;
    config.validate()?;
    if config.api_token.is_empty() {
        bail!("HYPERCACHE_API_TOKEN must be set; an empty token rejects every request");
    }
    info!(
        "Configuration loaded: role={}, port={}, api_path={}, async={}, cleanup_interval={}s",
        config.role, config.server_port, config.api_path, config.async_requests, config.cleanup_interval
    );

    // Keys arrive already prefixed, and a long-lived server must not answer from L1.
    let router = Arc::new(
        CacheRouter::from_config(&config)?
            .with_prefix("")
            .with_l1(false),
    );

    let cleanup_handle = match (config.role, router.store()) {
        (Role::Primary, Some(store)) if config.cleanup_interval > 0 => {
            info!("Background expiry sweep started");
            Some(spawn_cleanup_task(store.clone(), config.cleanup_interval))
        }
        _ => None,
    };

    let app = create_app(AppState::new(router.clone(), config.api_token.clone()), &config.api_path);

    let addr = format!("{}:{}", config.host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}{}", addr, config.api_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(handle) = cleanup_handle {
        handle.abort();
        warn!("Expiry sweep aborted");
    }

    let drained = router.drain().await;
    if drained > 0 {
        info!("Drained {} pending replication requests", drained);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// If a handler cannot be installed, that signal source is ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
