//! Axum HTTP surface: show intake/listing/status and one-shot job triggers,
//! mounted under `/api` plus bare `/health` and `/status` for liveness.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::SharedState;

mod error;
mod jobs;
mod shows;
mod system;
mod types;

pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: SharedState,
    pub start_time: std::time::Instant,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }
}

pub async fn create_app_state(shared: SharedState) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
    })
}

pub async fn create_app_state_from_config(config: Config) -> anyhow::Result<Arc<AppState>> {
    let shared = SharedState::new(config).await?;
    Ok(create_app_state(shared).await)
}

pub fn router(state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/shows", get(shows::list_shows).post(shows::upsert_show))
        .route("/shows/{id}/status", get(shows::show_status))
        .route("/intake", post(shows::intake))
        .route("/jobs/poll-now", post(jobs::poll_now))
        .route("/jobs/poll-show-now/{id}", post(jobs::poll_show_now))
        .route("/jobs/poll-show-async/{id}", post(jobs::poll_show_async))
        .route("/jobs/task/{job_id}", get(jobs::job_status))
        .route("/jobs/task/{job_id}/cancel", post(jobs::job_cancel))
        .route("/jobs/reconcile-now", post(jobs::reconcile_now))
        .route("/jobs/sync-metadata-now", post(jobs::sync_metadata_now))
        .route("/jobs/sync-now", post(jobs::sync_now))
        .route(
            "/jobs/qbit-maintenance-now",
            post(jobs::qbit_maintenance_now),
        )
        .route("/jobs/recovery-now", post(jobs::recovery_now))
        .with_state(state.clone());

    Router::new()
        .nest("/api", api_router)
        .route("/health", get(system::health))
        .route("/status", get(system::status))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}
