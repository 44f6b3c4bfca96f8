//! Integration tests for the invariants `db::Store` is responsible for
//! upholding across resolver and reconciler runs.

use curatr::db::Store;
use curatr::entities::episode::EpisodeState;

async fn spawn_store() -> Store {
    let db_path = std::env::temp_dir().join(format!("curatr-store-test-{}.db", uuid::Uuid::new_v4()));
    let db_url = format!("sqlite:{}", db_path.display());
    Store::new(&db_url)
        .await
        .unwrap_or_else(|e| panic!("failed to open store at {db_url}: {e}"))
}

#[tokio::test]
async fn episode_state_never_downgrades_from_downloaded() {
    let store = spawn_store().await;
    let show = store
        .upsert_show("Sousou no Frieren", "Frieren")
        .await
        .expect("upsert show");

    store
        .sync_episode_state(show.id, 1, EpisodeState::Downloaded, None)
        .await
        .expect("mark ep 1 downloaded");

    store
        .sync_episode_state(show.id, 1, EpisodeState::Missing, None)
        .await
        .expect("attempted downgrade to missing");

    let ep = store
        .get_episode(show.id, 1)
        .await
        .expect("get episode")
        .expect("episode row exists");
    assert_eq!(ep.state, EpisodeState::Downloaded.as_str());
}

#[tokio::test]
async fn upsert_show_is_idempotent_and_preserves_catalog_mapping() {
    let store = spawn_store().await;
    let show = store
        .upsert_show("Frieren S2", "Frieren")
        .await
        .expect("first upsert");

    store
        .set_show_catalog_mapping(show.id, 200, "airing", Some(24))
        .await
        .expect("set catalog mapping");

    // A later resolver pass re-upserting the same canonical title (e.g. after
    // a catalog lookup failure left nothing new to map) must not clear the
    // sticky mapping it already has.
    let reupserted = store
        .upsert_show("Frieren Season 2", "Frieren")
        .await
        .expect("second upsert");

    assert_eq!(reupserted.id, show.id);
    assert_eq!(reupserted.catalog_id, Some(200));
    assert_eq!(reupserted.total_eps, Some(24));
    assert_eq!(reupserted.status, "airing");
}

#[tokio::test]
async fn show_profile_materializes_a_default_row() {
    let store = spawn_store().await;
    let show = store
        .upsert_show("Demo Show", "Demo Show")
        .await
        .expect("upsert show");

    let profile = store
        .show_profile(show.id)
        .await
        .expect("profile read should never fail for a tracked show");
    assert!(profile.subgroups().is_empty());
    assert_eq!(profile.min_score, curatr::entities::show_profile::DEFAULT_MIN_SCORE);
}

#[tokio::test]
async fn delete_episode_overflow_preserves_downloaded_rows() {
    let store = spawn_store().await;
    let show = store
        .upsert_show("Overflow Show", "Overflow Show")
        .await
        .expect("upsert show");

    for ep in 1..=5 {
        store
            .sync_episode_state(show.id, ep, EpisodeState::Planned, None)
            .await
            .expect("seed planned episode");
    }
    store
        .sync_episode_state(show.id, 4, EpisodeState::Downloaded, None)
        .await
        .expect("mark ep 4 downloaded");

    // The catalog now says this show only has 3 episodes. Trimming overflow
    // rows above that count must still keep the one already downloaded.
    store
        .delete_episode_overflow(show.id, 3)
        .await
        .expect("trim overflow");

    let remaining = store.list_episodes(show.id).await.expect("list episodes");
    let remaining_nos: Vec<i32> = remaining.iter().map(|e| e.ep_no).collect();
    assert!(remaining_nos.contains(&4));
    assert!(!remaining_nos.contains(&5));
}
