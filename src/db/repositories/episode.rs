use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};

use crate::entities::episode::{self, EpisodeState};

pub struct EpisodeRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> EpisodeRepository<'a> {
    pub const fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(&self, show_id: i32) -> Result<Vec<episode::Model>, sea_orm::DbErr> {
        episode::Entity::find()
            .filter(episode::Column::ShowId.eq(show_id))
            .order_by_asc(episode::Column::EpNo)
            .all(self.db)
            .await
    }

    pub async fn get(
        &self,
        show_id: i32,
        ep_no: i32,
    ) -> Result<Option<episode::Model>, sea_orm::DbErr> {
        episode::Entity::find()
            .filter(episode::Column::ShowId.eq(show_id))
            .filter(episode::Column::EpNo.eq(ep_no))
            .one(self.db)
            .await
    }

    /// Create or update an episode row to `desired_state`, unless its current
    /// state is `downloaded` — downloaded episodes are never downgraded by the
    /// resolver or any other caller of this method. The reconciler promotes to
    /// `downloaded` through `mark_downloaded` instead.
    pub async fn sync_state(
        &self,
        show_id: i32,
        ep_no: i32,
        desired_state: EpisodeState,
        air_datetime: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<(), sea_orm::DbErr> {
        match self.get(show_id, ep_no).await? {
            Some(existing) => {
                if existing.state == EpisodeState::Downloaded.as_str() {
                    return Ok(());
                }
                let mut active: episode::ActiveModel = existing.into();
                active.state = Set(desired_state.as_str().to_string());
                active.air_datetime = Set(air_datetime.map(Into::into));
                active.update(self.db).await?;
            }
            None => {
                let active = episode::ActiveModel {
                    id: sea_orm::ActiveValue::NotSet,
                    show_id: Set(show_id),
                    ep_no: Set(ep_no),
                    state: Set(desired_state.as_str().to_string()),
                    air_datetime: Set(air_datetime.map(Into::into)),
                };
                active.insert(self.db).await?;
            }
        }
        Ok(())
    }

    pub async fn mark_downloaded(&self, show_id: i32, ep_no: i32) -> Result<(), sea_orm::DbErr> {
        match self.get(show_id, ep_no).await? {
            Some(existing) => {
                let mut active: episode::ActiveModel = existing.into();
                active.state = Set(EpisodeState::Downloaded.as_str().to_string());
                active.update(self.db).await?;
            }
            None => {
                let active = episode::ActiveModel {
                    id: sea_orm::ActiveValue::NotSet,
                    show_id: Set(show_id),
                    ep_no: Set(ep_no),
                    state: Set(EpisodeState::Downloaded.as_str().to_string()),
                    air_datetime: Set(None),
                };
                active.insert(self.db).await?;
            }
        }
        Ok(())
    }

    /// Deletes rows past `total_eps`, preserving any that are already downloaded.
    pub async fn delete_overflow(
        &self,
        show_id: i32,
        total_eps: i32,
    ) -> Result<(), sea_orm::DbErr> {
        let overflow = episode::Entity::find()
            .filter(episode::Column::ShowId.eq(show_id))
            .filter(episode::Column::EpNo.gt(total_eps))
            .all(self.db)
            .await?;
        for row in overflow {
            if row.state != EpisodeState::Downloaded.as_str() {
                episode::Entity::delete_by_id(row.id).exec(self.db).await?;
            }
        }
        Ok(())
    }

    pub async fn downloaded_count(&self, show_id: i32) -> Result<i64, sea_orm::DbErr> {
        let count = episode::Entity::find()
            .filter(episode::Column::ShowId.eq(show_id))
            .filter(episode::Column::State.eq(EpisodeState::Downloaded.as_str()))
            .count(self.db)
            .await?;
        Ok(count.try_into().unwrap_or(i64::MAX))
    }

    pub async fn latest_downloaded_ep(&self, show_id: i32) -> Result<Option<i32>, sea_orm::DbErr> {
        let rows = episode::Entity::find()
            .filter(episode::Column::ShowId.eq(show_id))
            .filter(episode::Column::State.eq(EpisodeState::Downloaded.as_str()))
            .order_by_desc(episode::Column::EpNo)
            .all(self.db)
            .await?;
        Ok(rows.first().map(|r| r.ep_no))
    }

    /// Episodes in {aired, missing} that are not downloaded.
    pub async fn wanted(&self, show_id: i32) -> Result<Vec<episode::Model>, sea_orm::DbErr> {
        let rows = episode::Entity::find()
            .filter(episode::Column::ShowId.eq(show_id))
            .order_by_asc(episode::Column::EpNo)
            .all(self.db)
            .await?;
        Ok(rows
            .into_iter()
            .filter(|r| {
                r.state == EpisodeState::Aired.as_str() || r.state == EpisodeState::Missing.as_str()
            })
            .collect())
    }
}
