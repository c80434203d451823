//! grantkeep server binary.
//!
//! Loads configuration, opens the storage backend, serves the OAuth endpoints and
//! runs the expired-token reaper until a shutdown signal arrives.

use anyhow::Result;
use grantkeep::{
    config::Config,
    errors::{ConfigError, StorageError},
    http::{AppState, build_router},
    oauth::GrantCoordinator,
    storage::{create_storage_backend, parse_storage_backend},
};
use std::{env, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "grantkeep=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();

    let version = grantkeep::config::version()?;

    env::args().for_each(|arg| {
        if arg == "--version" {
            println!("{version}");
            std::process::exit(0);
        }
    });

    tracing::info!(?version, "Starting grantkeep");

    let config = Config::new()?;

    let storage_backend =
        parse_storage_backend(&config.storage_backend, config.database_url.as_deref())
            .map_err(|e| ConfigError::InvalidStorageBackend(e.to_string()))?;
    tracing::info!(backend = %config.storage_backend, "opening storage");
    let storage = create_storage_backend(
        storage_backend,
        *config.database_max_connections.as_ref(),
    )
    .await
    .map_err(|err| match err {
        StorageError::ConnectionFailed(_) => anyhow::Error::from(err),
        err => ConfigError::SchemaSetupFailed(err.to_string()).into(),
    })?;

    let coordinator = Arc::new(GrantCoordinator::from_config(storage, &config));

    let app_context = AppState::new(Arc::new(config.clone()), coordinator.clone());
    let app = build_router(app_context);

    // Setup graceful shutdown
    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    {
        let tracker = tracker.clone();
        let inner_token = token.clone();

        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!("failed to install Ctrl+C handler: {}", err);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    tracing::error!("failed to install signal handler: {}", err);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::spawn(async move {
            tokio::select! {
                () = inner_token.cancelled() => { },
                _ = terminate => {},
                _ = ctrl_c => {},
            }

            tracker.close();
            inner_token.cancel();
        });
    }

    // Expired-row reaper
    if let Some(interval) = *config.reaper_interval.as_ref() {
        let inner_token = token.clone();
        let coordinator = coordinator.clone();
        tracker.spawn(async move {
            tracing::info!(interval = ?interval, "Starting reaper");
            reap(coordinator, interval, inner_token).await;
            tracing::info!("reaper stopped");
        });
    }

    // Start HTTP server
    {
        let http_port = *config.http_port.as_ref();
        let inner_token = token.clone();
        tracker.spawn(async move {
            let bind_address = format!("0.0.0.0:{http_port}");
            tracing::info!("Starting server on {bind_address}");
            let listener = match TcpListener::bind(&bind_address).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!("failed to bind {}: {}", bind_address, err);
                    inner_token.cancel();
                    return;
                }
            };

            let shutdown_token = inner_token.clone();
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    tokio::select! {
                        () = shutdown_token.cancelled() => { }
                    }
                    tracing::info!("axum graceful shutdown complete");
                })
                .await;
            if let Err(err) = result {
                tracing::error!("axum task failed: {}", err);
            }

            inner_token.cancel();
        });
    }

    tracker.wait().await;

    Ok(())
}

async fn reap(coordinator: Arc<GrantCoordinator>, interval: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                match coordinator.purge_expired().await {
                    Ok(purged) if purged > 0 => tracing::info!(purged, "reaper removed expired tokens"),
                    Ok(_) => {}
                    Err(err) => tracing::error!(error = ?err, "reaper pass failed"),
                }
            }
        }
    }
}
