//! ==============================================================================
//! main.rs - sensor hub entry point
//! ==============================================================================
//!
//! purpose:
//!     the hub two esp32 boards report to. one posts aht21 temperature and
//!     humidity, the other an mq6 gas reading. the hub stores every reading,
//!     knows which board is still talking, keeps the database bounded and
//!     draws charts for the dashboard.
//!
//! responsibilities:
//!     - load configuration (config.rs)
//!     - open the reading store (store/: postgres or in-memory)
//!     - start the liveness sweeper (liveness.rs)
//!     - start the retention task (retention.rs)
//!     - serve the http api + dashboard (server.rs)
//!     - stop all of the above on ctrl-c / sigterm
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                      sensor hub (this file)                 │
//!     │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//!     │  │ web server  │  │  sweeper    │  │  retention task     │  │
//!     │  │ (axum)      │  │ (5s cycle)  │  │  (size check)       │  │
//!     │  └──┬───────┬──┘  └──────┬──────┘  └──────────┬──────────┘  │
//!     │     │       │            │                    │             │
//!     │     │  ┌────┴────────────┴───┐                │             │
//!     │     │  │  liveness tracker   │                │             │
//!     │     │  └─────────────────────┘                │             │
//!     │     └──────────────┬──────────────────────────┘             │
//!     │              ┌─────┴─────┐                                  │
//!     │              │   store   │ <- store/                        │
//!     │              └─────┬─────┘                                  │
//!     └────────────────────┼────────────────────────────────────────┘
//!                          ▼
//!                     postgresql
//!
//! ==============================================================================

mod chart;
mod config;
mod domain;
mod error;
mod liveness;
mod pages;
mod retention;
mod server;
mod size;
mod store;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use config::{AppConfig, Backend};
use liveness::LivenessTracker;
use store::{MemoryStore, PgStore, ReadingStore};

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Sensor Hub - ESP32 telemetry");
    println!("===========================================================");

    // step 1: load configuration
    let config = AppConfig::load_or_default()?;
    init_logging(&config.logging.level);
    config.print_summary();

    // step 2: open the store
    let mut pg = None;
    let store: Arc<dyn ReadingStore> = match config.database.backend {
        Backend::Postgres => {
            let s = PgStore::connect_lazy(&config.database);
            pg = Some(s.clone());
            Arc::new(s)
        }
        Backend::Memory => {
            tracing::warn!("using in-memory store, readings are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    if config.database.create_schema {
        // a database that is down now may be up later; requests will say so
        if let Err(e) = store.ensure_schema().await {
            tracing::error!(error = %e, "could not prepare database schema");
        }
    }

    // step 3: liveness tracking
    let tracker = LivenessTracker::new(
        [config.devices.climate.clone(), config.devices.gas.clone()],
        config.liveness.window(),
    );
    if config.liveness.sweep_interval_seconds >= config.liveness.window_seconds {
        tracing::warn!(
            sweep = config.liveness.sweep_interval_seconds,
            window = config.liveness.window_seconds,
            "sweep interval is not below the liveness window; last-seen times may linger an extra sweep"
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = vec![liveness::spawn_sweeper(
        tracker.clone(),
        config.liveness.sweep_interval(),
        shutdown_rx.clone(),
    )];

    // step 4: retention
    if config.retention.enabled {
        tasks.push(retention::spawn_retention(
            store.clone(),
            config.retention.policy(),
            config.retention.check_interval(),
            shutdown_rx.clone(),
        ));
    }

    // step 5: web server, runs until a shutdown signal arrives
    let state = server::AppState {
        store,
        tracker,
        climate_device: config.devices.climate.clone(),
        gas_device: config.devices.gas.clone(),
    };
    let app = server::router(state, Duration::from_secs(config.server.request_timeout_seconds));

    let listener = tokio::net::TcpListener::bind(&config.server.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen_address))?;
    tracing::info!(address = %config.server.listen_address, "dashboard live");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("web server error")?;

    // step 6: stop background work
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "background task panicked");
        }
    }
    if let Some(pg) = pg {
        pg.close().await;
    }
    Ok(())
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for sigterm");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
