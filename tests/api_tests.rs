//! Integration tests driving the real Axum router, matching the status
//! regression and bulk-intake behavior the HTTP surface is contracted to.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use curatr::config::Config;
use curatr::entities::episode::EpisodeState;
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

async fn spawn_app() -> (Arc<curatr::api::AppState>, Router) {
    let db_path = std::env::temp_dir().join(format!("curatr-api-test-{}.db", uuid::Uuid::new_v4()));
    let incoming = std::env::temp_dir().join(format!("curatr-api-incoming-{}", uuid::Uuid::new_v4()));
    let library = std::env::temp_dir().join(format!("curatr-api-library-{}", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_url = format!("sqlite:{}", db_path.display());
    config.library.incoming_root = incoming.to_string_lossy().to_string();
    config.library.library_root = library.to_string_lossy().to_string();

    let state = curatr::api::create_app_state_from_config(config)
        .await
        .expect("failed to create app state");
    let router = curatr::api::router(state.clone());
    (state, router)
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn show_status_uses_downloaded_count_not_latest_episode() {
    let (state, app) = spawn_app().await;

    let show = state
        .store()
        .upsert_show("Status Regression Show", "Status Regression Show")
        .await
        .expect("seed show");
    state
        .store()
        .set_show_catalog_mapping(show.id, 1, "airing", Some(13))
        .await
        .expect("set total_eps");

    // Only episode 13 is downloaded; episodes 1..12 were never seen.
    state
        .store()
        .sync_episode_state(show.id, 13, EpisodeState::Downloaded, None)
        .await
        .expect("mark ep 13 downloaded");

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/shows/{}/status", show.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["downloaded_count"], serde_json::json!(1));
    assert_eq!(body["data"]["latest_downloaded_episode"], serde_json::json!(13));
    assert_eq!(body["data"]["missing_count"], serde_json::json!(12));
    assert_eq!(body["data"]["complete"], serde_json::json!(false));
}

#[tokio::test]
async fn show_status_is_complete_once_downloaded_count_reaches_total() {
    let (state, app) = spawn_app().await;

    let show = state
        .store()
        .upsert_show("Finished Show", "Finished Show")
        .await
        .expect("seed show");
    state
        .store()
        .set_show_catalog_mapping(show.id, 2, "finished", Some(2))
        .await
        .expect("set total_eps");
    for ep in 1..=2 {
        state
            .store()
            .sync_episode_state(show.id, ep, EpisodeState::Downloaded, None)
            .await
            .expect("mark episode downloaded");
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/shows/{}/status", show.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["complete"], serde_json::json!(true));
}

#[tokio::test]
async fn show_status_for_unknown_id_is_not_found() {
    let (_state, app) = spawn_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/shows/999/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn intake_bulk_upserts_shows_aliases_and_profile() {
    let (state, app) = spawn_app().await;

    let payload = serde_json::json!({
        "shows": [{
            "title_input": "Sousou no Frieren Season 2",
            "title_canonical": "Frieren",
            "aliases": ["葬送的芙莉莲 第2季"],
            "preferred_subgroups": ["SubsPlease"],
            "min_score": 80
        }]
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/intake")
                .header("Content-Type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let results = body["data"].as_array().expect("intake results array");
    assert_eq!(results.len(), 1);

    let show_id = results[0]["show_id"].as_i64().unwrap() as i32;
    let aliases = state.store().show_aliases(show_id).await.unwrap();
    assert_eq!(aliases, vec!["葬送的芙莉莲 第2季".to_string()]);

    let profile = state.store().show_profile(show_id).await.unwrap();
    assert_eq!(profile.min_score, 80);
    assert_eq!(profile.subgroups(), vec!["SubsPlease".to_string()]);
}

#[tokio::test]
async fn upsert_show_rejects_blank_canonical_title() {
    let (_state, app) = spawn_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/shows")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({"title_input": "x", "title_canonical": "  "}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (_state, app) = spawn_app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], serde_json::json!("ok"));
}
