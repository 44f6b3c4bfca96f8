//! `/health` and `/status`: liveness and a brief operational snapshot.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;

use super::error::ApiError;
use super::types::{ApiResponse, HealthDto};
use super::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let shows = state.shared.store.list_shows().await?;
    let releases = state.shared.store.list_all_releases().await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "tracked_shows": shows.len(),
        "total_releases": releases.len(),
    }))))
}
