use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter,
};

use crate::entities::release::{self, ReleaseState};

pub struct ReleaseRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ReleaseRepository<'a> {
    pub const fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list_for_show(&self, show_id: i32) -> Result<Vec<release::Model>, sea_orm::DbErr> {
        release::Entity::find()
            .filter(release::Column::ShowId.eq(show_id))
            .all(self.db)
            .await
    }

    pub async fn list_all(&self) -> Result<Vec<release::Model>, sea_orm::DbErr> {
        release::Entity::find().all(self.db).await
    }

    pub async fn exists(
        &self,
        show_id: i32,
        ep_no: i32,
        magnet_or_torrent: &str,
    ) -> Result<bool, sea_orm::DbErr> {
        let found = release::Entity::find()
            .filter(release::Column::ShowId.eq(show_id))
            .filter(release::Column::EpNo.eq(ep_no))
            .filter(release::Column::MagnetOrTorrent.eq(magnet_or_torrent))
            .one(self.db)
            .await?;
        Ok(found.is_some())
    }

    pub async fn has_pending_for_episode(
        &self,
        show_id: i32,
        ep_no: i32,
    ) -> Result<bool, sea_orm::DbErr> {
        let found = release::Entity::find()
            .filter(release::Column::ShowId.eq(show_id))
            .filter(release::Column::EpNo.eq(ep_no))
            .one(self.db)
            .await?;
        Ok(found.is_some())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        show_id: i32,
        ep_no: i32,
        source: &str,
        title: &str,
        magnet_or_torrent: &str,
        quality: Option<&str>,
        subgroup: Option<&str>,
        score: i32,
    ) -> Result<release::Model, sea_orm::DbErr> {
        let active = release::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            show_id: Set(show_id),
            ep_no: Set(ep_no),
            source: Set(source.to_string()),
            title: Set(title.to_string()),
            magnet_or_torrent: Set(magnet_or_torrent.to_string()),
            quality: Set(quality.map(ToString::to_string)),
            subgroup: Set(subgroup.map(ToString::to_string)),
            score: Set(score),
            state: Set(ReleaseState::Queued.as_str().to_string()),
            created_at: Set(Utc::now().into()),
        };
        active.insert(self.db).await
    }

    pub async fn delete(&self, id: i32) -> Result<(), sea_orm::DbErr> {
        release::Entity::delete_by_id(id).exec(self.db).await?;
        Ok(())
    }

    pub async fn delete_for_show_episode(
        &self,
        show_id: i32,
        ep_no: i32,
    ) -> Result<(), sea_orm::DbErr> {
        release::Entity::delete_many()
            .filter(release::Column::ShowId.eq(show_id))
            .filter(release::Column::EpNo.eq(ep_no))
            .exec(self.db)
            .await?;
        Ok(())
    }
}
