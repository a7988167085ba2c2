//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use fabricpoll_core::DeviceKind;
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// List configured pollers and whether they are running
pub async fn list_pollers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.poller_statuses().await)
}

/// Liveness maps of every polled device kind
pub async fn get_liveness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.all_liveness())
}

/// Liveness map of one device kind
pub async fn get_kind_liveness(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> impl IntoResponse {
    let kind: DeviceKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ApiError::new(e.to_string()))).into_response()
        }
    };

    match state.liveness(kind) {
        Some(map) => Json(map).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiError::new(format!("no pollers for {}", kind))),
        )
            .into_response(),
    }
}
