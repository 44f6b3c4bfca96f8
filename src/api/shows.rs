//! `/shows` and `/intake`: show upsert, listing, status, and bulk intake.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};

use super::error::ApiError;
use super::types::{
    ApiResponse, IntakeRequest, IntakeResultDto, ShowDto, ShowStatusDto, UpsertShowRequest,
};
use super::AppState;

pub async fn upsert_show(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpsertShowRequest>,
) -> Result<Json<ApiResponse<ShowDto>>, ApiError> {
    if req.title_canonical.trim().is_empty() {
        return Err(ApiError::validation("title_canonical must not be empty"));
    }
    let show = state
        .shared
        .store
        .upsert_show(&req.title_input, &req.title_canonical)
        .await?;
    Ok(Json(ApiResponse::success(show.into())))
}

pub async fn list_shows(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<ShowDto>>>, ApiError> {
    let shows = state.shared.store.list_shows().await?;
    Ok(Json(ApiResponse::success(
        shows.into_iter().map(ShowDto::from).collect(),
    )))
}

pub async fn show_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<ShowStatusDto>>, ApiError> {
    let show = state
        .shared
        .store
        .get_show(id)
        .await?
        .ok_or_else(|| ApiError::show_not_found(id))?;

    let downloaded_count = state.shared.store.downloaded_episode_count(id).await?;
    let latest_downloaded_episode = state.shared.store.latest_downloaded_episode(id).await?;
    let complete = show
        .total_eps
        .is_some_and(|total| downloaded_count >= i64::from(total));
    let missing_count = show
        .total_eps
        .map(|total| (i64::from(total) - downloaded_count).max(0));

    Ok(Json(ApiResponse::success(ShowStatusDto {
        show_id: show.id,
        title_canonical: show.title_canonical,
        downloaded_count,
        total_eps: show.total_eps,
        latest_downloaded_episode,
        missing_count,
        complete,
    })))
}

/// Bulk-upserts shows with their aliases and quality profile in one call, the
/// entry point for seeding the tracker from an external watch list.
pub async fn intake(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IntakeRequest>,
) -> Result<Json<ApiResponse<Vec<IntakeResultDto>>>, ApiError> {
    let store = &state.shared.store;
    let mut results = Vec::with_capacity(req.shows.len());

    for entry in req.shows {
        if entry.title_canonical.trim().is_empty() {
            continue;
        }
        let show = store
            .upsert_show(&entry.title_input, &entry.title_canonical)
            .await?;

        for alias in &entry.aliases {
            if !alias.trim().is_empty() {
                store.add_show_alias(show.id, alias).await?;
            }
        }

        if !entry.preferred_subgroups.is_empty() || entry.min_score.is_some() {
            let profile = store.show_profile(show.id).await?;
            let min_score = entry.min_score.unwrap_or(profile.min_score);
            let subgroups = if entry.preferred_subgroups.is_empty() {
                profile.subgroups()
            } else {
                entry.preferred_subgroups
            };
            store
                .set_show_profile(show.id, &subgroups, min_score)
                .await?;
        }

        results.push(IntakeResultDto {
            show_id: show.id,
            title_canonical: show.title_canonical,
        });
    }

    Ok(Json(ApiResponse::success(results)))
}
