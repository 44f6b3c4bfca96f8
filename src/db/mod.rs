use anyhow::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use crate::entities::episode::Model as EpisodeRow;
pub use crate::entities::release::Model as ReleaseRow;
pub use crate::entities::show::Model as ShowRow;
pub use crate::entities::show_profile::Model as ShowProfileRow;

/// Typed persistent store of shows, aliases, profiles, episodes and releases.
///
/// A thin facade over per-entity repositories, cloneable and cheap to pass
/// around since `DatabaseConnection` itself is an `Arc` internally.
#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.starts_with(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    fn shows(&self) -> repositories::show::ShowRepository<'_> {
        repositories::show::ShowRepository::new(&self.conn)
    }

    fn episodes(&self) -> repositories::episode::EpisodeRepository<'_> {
        repositories::episode::EpisodeRepository::new(&self.conn)
    }

    fn releases(&self) -> repositories::release::ReleaseRepository<'_> {
        repositories::release::ReleaseRepository::new(&self.conn)
    }

    // -- Shows -------------------------------------------------------------

    pub async fn list_shows(&self) -> Result<Vec<ShowRow>, sea_orm::DbErr> {
        self.shows().list().await
    }

    pub async fn get_show(&self, id: i32) -> Result<Option<ShowRow>, sea_orm::DbErr> {
        self.shows().get(id).await
    }

    pub async fn get_show_by_canonical_title(
        &self,
        title_canonical: &str,
    ) -> Result<Option<ShowRow>, sea_orm::DbErr> {
        self.shows().get_by_canonical_title(title_canonical).await
    }

    pub async fn upsert_show(
        &self,
        title_input: &str,
        title_canonical: &str,
    ) -> Result<ShowRow, sea_orm::DbErr> {
        self.shows()
            .upsert_by_canonical_title(title_input, title_canonical)
            .await
    }

    pub async fn set_show_catalog_mapping(
        &self,
        id: i32,
        catalog_id: i32,
        status: &str,
        total_eps: Option<i32>,
    ) -> Result<(), sea_orm::DbErr> {
        self.shows()
            .set_catalog_mapping(id, catalog_id, status, total_eps)
            .await
    }

    pub async fn set_show_ep_offset(&self, id: i32, ep_offset: i32) -> Result<(), sea_orm::DbErr> {
        self.shows().set_ep_offset(id, ep_offset).await
    }

    pub async fn show_aliases(&self, show_id: i32) -> Result<Vec<String>, sea_orm::DbErr> {
        self.shows().aliases(show_id).await
    }

    pub async fn add_show_alias(&self, show_id: i32, alias: &str) -> Result<(), sea_orm::DbErr> {
        self.shows().add_alias(show_id, alias).await
    }

    pub async fn show_profile(&self, show_id: i32) -> Result<ShowProfileRow, sea_orm::DbErr> {
        self.shows().profile(show_id).await
    }

    pub async fn set_show_profile(
        &self,
        show_id: i32,
        preferred_subgroups: &[String],
        min_score: i32,
    ) -> Result<(), sea_orm::DbErr> {
        self.shows()
            .set_profile(show_id, preferred_subgroups, min_score)
            .await
    }

    // -- Episodes ------------------------------------------------------------

    pub async fn list_episodes(&self, show_id: i32) -> Result<Vec<EpisodeRow>, sea_orm::DbErr> {
        self.episodes().list(show_id).await
    }

    pub async fn get_episode(
        &self,
        show_id: i32,
        ep_no: i32,
    ) -> Result<Option<EpisodeRow>, sea_orm::DbErr> {
        self.episodes().get(show_id, ep_no).await
    }

    pub async fn sync_episode_state(
        &self,
        show_id: i32,
        ep_no: i32,
        desired_state: crate::entities::episode::EpisodeState,
        air_datetime: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<(), sea_orm::DbErr> {
        self.episodes()
            .sync_state(show_id, ep_no, desired_state, air_datetime)
            .await
    }

    pub async fn mark_episode_downloaded(
        &self,
        show_id: i32,
        ep_no: i32,
    ) -> Result<(), sea_orm::DbErr> {
        self.episodes().mark_downloaded(show_id, ep_no).await
    }

    pub async fn delete_episode_overflow(
        &self,
        show_id: i32,
        total_eps: i32,
    ) -> Result<(), sea_orm::DbErr> {
        self.episodes().delete_overflow(show_id, total_eps).await
    }

    pub async fn downloaded_episode_count(&self, show_id: i32) -> Result<i64, sea_orm::DbErr> {
        self.episodes().downloaded_count(show_id).await
    }

    pub async fn latest_downloaded_episode(
        &self,
        show_id: i32,
    ) -> Result<Option<i32>, sea_orm::DbErr> {
        self.episodes().latest_downloaded_ep(show_id).await
    }

    pub async fn wanted_episodes(&self, show_id: i32) -> Result<Vec<EpisodeRow>, sea_orm::DbErr> {
        self.episodes().wanted(show_id).await
    }

    // -- Releases --------------------------------------------------------

    pub async fn list_releases_for_show(
        &self,
        show_id: i32,
    ) -> Result<Vec<ReleaseRow>, sea_orm::DbErr> {
        self.releases().list_for_show(show_id).await
    }

    pub async fn list_all_releases(&self) -> Result<Vec<ReleaseRow>, sea_orm::DbErr> {
        self.releases().list_all().await
    }

    pub async fn release_exists(
        &self,
        show_id: i32,
        ep_no: i32,
        magnet_or_torrent: &str,
    ) -> Result<bool, sea_orm::DbErr> {
        self.releases()
            .exists(show_id, ep_no, magnet_or_torrent)
            .await
    }

    pub async fn episode_has_pending_release(
        &self,
        show_id: i32,
        ep_no: i32,
    ) -> Result<bool, sea_orm::DbErr> {
        self.releases()
            .has_pending_for_episode(show_id, ep_no)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_release(
        &self,
        show_id: i32,
        ep_no: i32,
        source: &str,
        title: &str,
        magnet_or_torrent: &str,
        quality: Option<&str>,
        subgroup: Option<&str>,
        score: i32,
    ) -> Result<ReleaseRow, sea_orm::DbErr> {
        self.releases()
            .create(
                show_id,
                ep_no,
                source,
                title,
                magnet_or_torrent,
                quality,
                subgroup,
                score,
            )
            .await
    }

    pub async fn delete_release(&self, id: i32) -> Result<(), sea_orm::DbErr> {
        self.releases().delete(id).await
    }

    pub async fn delete_releases_for_episode(
        &self,
        show_id: i32,
        ep_no: i32,
    ) -> Result<(), sea_orm::DbErr> {
        self.releases()
            .delete_for_show_episode(show_id, ep_no)
            .await
    }
}
