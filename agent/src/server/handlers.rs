//! HTTP request handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::app::shutdown::QuitSource;
use crate::bootstrap::fsm::BootstrapState;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "spirit-box".to_string(),
        version: version_info().version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Watched units, in watch order
pub async fn systemd_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let snapshot = state.watcher.snapshot().await;
    Json(snapshot.units.clone())
}

/// Priority groups with per-script status
pub async fn scripts_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.scheduler.snapshot().await.groups)
}

/// Bootstrap response
#[derive(Debug, Serialize)]
pub struct BootstrapResponse {
    pub enabled: bool,
    pub state: Option<BootstrapState>,
}

pub async fn bootstrap_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let current = state.bootstrap.as_ref().map(|rx| *rx.borrow());
    Json(BootstrapResponse {
        enabled: current.is_some(),
        state: current,
    })
}

/// Quit response
#[derive(Debug, Serialize)]
pub struct QuitResponse {
    /// False if another source had already asked to quit
    pub accepted: bool,
}

pub async fn quit_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let accepted = state.quit.trigger(QuitSource::Api);
    (StatusCode::ACCEPTED, Json(QuitResponse { accepted }))
}
