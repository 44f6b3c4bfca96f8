//! `/jobs/*`: synchronous and async triggers for the pipeline, reconciler,
//! resolver and torrent maintenance, plus job status lookup.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde_json::json;

use super::error::ApiError;
use super::types::{ApiResponse, JobOkDto, JobStatusDto, JobSubmittedDto};
use super::AppState;

const ASYNC_POLL_TIMEOUT_SEC: u64 = 80;

pub async fn poll_now(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<JobOkDto>>, ApiError> {
    let report = state
        .shared
        .pipeline
        .poll_and_enqueue(None)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(JobOkDto::new(json!({
        "shows": report.shows,
        "candidates": report.candidates,
        "scanned": report.scanned,
        "added": report.added,
    })))))
}

pub async fn poll_show_now(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<JobOkDto>>, ApiError> {
    let report = state
        .shared
        .pipeline
        .poll_and_enqueue(Some(&[id]))
        .await
        .map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(JobOkDto::new(json!({
        "shows": report.shows,
        "candidates": report.candidates,
        "scanned": report.scanned,
        "added": report.added,
    })))))
}

pub async fn poll_show_async(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Json<JobSubmittedDto> {
    let pipeline = state.shared.pipeline.clone();
    let job_id = state
        .shared
        .job_runner
        .submit("poll_show", ASYNC_POLL_TIMEOUT_SEC, async move {
            pipeline
                .poll_and_enqueue(Some(&[id]))
                .await
                .map(|r| format!("added {} releases across {} candidates", r.added, r.candidates))
                .map_err(|e| e.to_string())
        })
        .await;
    Json(JobSubmittedDto {
        ok: true,
        job_id,
    })
}

pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<JobStatusDto>>, ApiError> {
    let record = state
        .shared
        .job_runner
        .get(&job_id)
        .await
        .ok_or_else(|| ApiError::job_not_found(&job_id))?;
    Ok(Json(ApiResponse::success(JobStatusDto {
        id: record.id,
        kind: record.kind,
        status: format!("{:?}", record.status).to_lowercase(),
        result: record.result,
        error: record.error,
    })))
}

pub async fn job_cancel(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Json<ApiResponse<JobOkDto>> {
    let cancelled = state.shared.job_runner.cancel(&job_id).await;
    Json(ApiResponse::success(JobOkDto::new(
        json!({ "cancelled": cancelled }),
    )))
}

pub async fn reconcile_now(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<JobOkDto>>, ApiError> {
    let report = state.shared.reconciler.run().await.map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(JobOkDto::new(json!({
        "scanned": report.scanned,
        "moved": report.moved,
        "extras": report.extras,
        "needs_review": report.needs_review,
        "invalid": report.invalid,
    })))))
}

pub async fn sync_metadata_now(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<JobOkDto>>, ApiError> {
    let outcome = state.shared.resolver.sync_all().await.map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(JobOkDto::new(json!({
        "updated": outcome.updated,
        "no_match": outcome.no_match,
        "transient_failures": outcome.transient_failures,
    })))))
}

pub async fn sync_now(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<JobOkDto>>, ApiError> {
    let sync = state.shared.resolver.sync_all().await.map_err(ApiError::from)?;
    let poll = state
        .shared
        .pipeline
        .poll_and_enqueue(None)
        .await
        .map_err(ApiError::from)?;
    let reconcile = state.shared.reconciler.run().await.map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(JobOkDto::new(json!({
        "updated": sync.updated,
        "added": poll.added,
        "moved": reconcile.moved,
    })))))
}

pub async fn qbit_maintenance_now(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<JobOkDto>>, ApiError> {
    let report = crate::services::torrent_maintenance::cleanup_stalled(
        &state.shared.qbit,
        &state.shared.store,
        &state.shared.qbit_category,
        &state.shared.qbit_save_root,
        20,
    )
    .await
    .map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(JobOkDto::new(json!({
        "total": report.total,
        "removed_torrents": report.removed_torrents,
        "removed_release_rows": report.removed_release_rows,
    })))))
}

pub async fn recovery_now(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<JobOkDto>>, ApiError> {
    let sync = state.shared.resolver.sync_all().await.map_err(ApiError::from)?;
    let reconcile = state.shared.reconciler.run().await.map_err(ApiError::from)?;
    let poll = state
        .shared
        .pipeline
        .poll_and_enqueue(None)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(ApiResponse::success(JobOkDto::new(json!({
        "updated": sync.updated,
        "invalid": reconcile.invalid,
        "moved": reconcile.moved,
        "added": poll.added,
    })))))
}
