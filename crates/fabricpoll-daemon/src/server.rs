//! Status server setup and routing

use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api;
use crate::state::AppState;

/// Read-only status API
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/pollers", get(api::list_pollers))
        .route("/api/liveness", get(api::get_liveness))
        .route("/api/liveness/{kind}", get(api::get_kind_liveness))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start the pollers and serve the status API until interrupted, then stop
/// every poller before returning. Pollers whose endpoint was unreachable are
/// retried on the shortest poll interval.
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    state.start_all().await;
    let restarts = state
        .retry_interval()
        .map(|interval| tokio::spawn(state.clone().restart_stopped(interval)));

    let served = if state.config.daemon.api_enabled {
        serve(state.clone(), bind).await
    } else {
        info!("Status API disabled, polling until interrupted");
        shutdown_signal().await;
        Ok(())
    };

    state.stop_all().await;
    if let Some(restarts) = restarts {
        if let Err(e) = restarts.await {
            warn!(error = %e, "Poller restart loop ended abnormally");
        }
    }
    served
}

async fn serve(state: Arc<AppState>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting status server");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
