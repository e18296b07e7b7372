//! HTTP server setup
//!
//! The listener is supervised: when the network bootstrap reports that the
//! primary service is up, the current listener is shut down gracefully and a
//! new one is bound in its place.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::app::options::ServerOptions;
use crate::bootstrap::controller::PrimaryReady;
use crate::errors::AgentError;
use crate::server::handlers::{
    bootstrap_handler, health_handler, quit_handler, scripts_handler, systemd_handler,
    version_handler,
};
use crate::server::state::ServerState;

/// Build the status API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Bring-up status
        .route("/systemd", get(systemd_handler))
        .route("/scripts", get(scripts_handler))
        .route("/bootstrap", get(bootstrap_handler))
        // Lifecycle
        .route("/quit", get(quit_handler).post(quit_handler))
        // State and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
///
/// The first bind happens before returning so that a busy port is reported
/// to the caller. `primary_ready` carries the restart request from the
/// network bootstrap, if any.
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    primary_ready: Option<oneshot::Receiver<PrimaryReady>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<JoinHandle<Result<(), AgentError>>, AgentError> {
    let addr = format!("{}:{}", options.host, options.port);
    let restart_delay = options.restart_delay;
    let mut listener = bind(&addr).await?;

    let handle = tokio::spawn(async move {
        let mut primary_ready = primary_ready;

        loop {
            let (stop_tx, stop_rx) = oneshot::channel::<()>();
            let server = axum::serve(listener, router(state.clone()))
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .into_future();
            tokio::pin!(server);

            tokio::select! {
                result = &mut server => {
                    return result.map_err(|e| AgentError::ServerError(e.to_string()));
                }
                _ = shutdown_rx.recv() => {
                    let _ = stop_tx.send(());
                    server.await.map_err(|e| AgentError::ServerError(e.to_string()))?;
                    info!("HTTP server stopped");
                    return Ok(());
                }
                ready = await_primary_ready(&mut primary_ready, restart_delay) => {
                    info!("Primary service ready, restarting HTTP listener...");
                    let _ = stop_tx.send(());
                    server.await.map_err(|e| AgentError::ServerError(e.to_string()))?;
                    listener = bind(&addr).await?;
                    ready.acknowledge();
                }
            }
        }
    });

    Ok(handle)
}

async fn bind(addr: &str) -> Result<TcpListener, AgentError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AgentError::ServerError(format!("{}: {}", addr, e)))?;
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| addr.to_string());
    info!("Starting HTTP server on {}", local);
    Ok(listener)
}

/// Resolve once the primary ready signal arrives, never if there is none
///
/// The signal is only looked at after `delay`, so a listener that has just
/// been bound is not torn down straight away.
async fn await_primary_ready(
    primary_ready: &mut Option<oneshot::Receiver<PrimaryReady>>,
    delay: Duration,
) -> PrimaryReady {
    tokio::time::sleep(delay).await;

    let result = match primary_ready.as_mut() {
        Some(rx) => rx.await,
        None => return std::future::pending().await,
    };
    *primary_ready = None;

    match result {
        Ok(ready) => ready,
        Err(_) => {
            debug!("Primary ready sender dropped, listener will not restart");
            std::future::pending().await
        }
    }
}
