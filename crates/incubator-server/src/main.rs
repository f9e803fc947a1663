mod config;
mod sweep;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use incubator_api::AppStateInner;
use incubator_auth::SessionGuard;
use incubator_db::{Database, DbOptions};
use incubator_simulator::{Simulator, SimulatorConfig};

use crate::config::ServerConfig;

const SESSION_SWEEP_PERIOD: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "incubator=debug,tower_http=debug".into()),
        )
        .init();

    let cfg = ServerConfig::from_env()?;

    // Schema is created or verified here, before anything else can touch it
    let db = Database::open_with(
        &PathBuf::from(&cfg.db_path),
        DbOptions {
            reader_pool_size: cfg.reader_pool_size,
            timeout: cfg.db_timeout,
        },
    )
    .with_context(|| format!("opening database at {}", cfg.db_path))?;
    let db = Arc::new(db);
    info!("Database ready at {}", cfg.db_path);

    let simulator = Simulator::new(
        db.clone(),
        SimulatorConfig {
            interval: cfg.tick_interval,
            max_ticks: None,
        },
    )
    .start();

    let state = Arc::new(AppStateInner::new(db.clone(), SessionGuard::new(cfg.session_ttl)));

    let sweep_cancel = CancellationToken::new();
    let sweep_task = tokio::spawn(sweep::run_session_sweep(
        state.clone(),
        SESSION_SWEEP_PERIOD,
        sweep_cancel.clone(),
    ));

    let app = incubator_api::router(state.clone())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!("Incubator dashboard listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Stop background work before the store goes away, even if serving failed
    sweep_cancel.cancel();
    if let Err(e) = sweep_task.await {
        warn!("Session sweep ended abnormally: {}", e);
    }
    match simulator.stop().await {
        Ok(ticks) => info!("Simulator stopped after {} ticks", ticks),
        Err(e) => warn!("Simulator ended abnormally: {}", e),
    }
    served?;

    drop(state);
    match Arc::try_unwrap(db) {
        Ok(db) => db.close()?,
        Err(_) => warn!("Database still shared at shutdown, leaving connections to drop"),
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
