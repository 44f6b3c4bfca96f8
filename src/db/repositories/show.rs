use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder,
};

use crate::entities::{show, show_alias, show_profile};

pub struct ShowRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> ShowRepository<'a> {
    pub const fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<show::Model>, sea_orm::DbErr> {
        show::Entity::find()
            .order_by_asc(show::Column::Id)
            .all(self.db)
            .await
    }

    pub async fn get(&self, id: i32) -> Result<Option<show::Model>, sea_orm::DbErr> {
        show::Entity::find_by_id(id).one(self.db).await
    }

    pub async fn get_by_canonical_title(
        &self,
        title_canonical: &str,
    ) -> Result<Option<show::Model>, sea_orm::DbErr> {
        show::Entity::find()
            .filter(show::Column::TitleCanonical.eq(title_canonical))
            .one(self.db)
            .await
    }

    /// Upsert a show by canonical title. Returns the show row, created or existing.
    /// Leaves `catalog_id`/`status`/`total_eps` untouched on an existing row — only
    /// the resolver is allowed to mutate those fields.
    pub async fn upsert_by_canonical_title(
        &self,
        title_input: &str,
        title_canonical: &str,
    ) -> Result<show::Model, sea_orm::DbErr> {
        if let Some(existing) = self.get_by_canonical_title(title_canonical).await? {
            return Ok(existing);
        }

        let active = show::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            title_input: Set(title_input.to_string()),
            title_canonical: Set(title_canonical.to_string()),
            catalog_id: Set(None),
            status: Set("planned".to_string()),
            total_eps: Set(None),
            ep_offset: Set(0),
            created_at: Set(Utc::now().into()),
        };
        active.insert(self.db).await
    }

    /// Sticky catalog mapping: only ever called with a value, and never cleared
    /// by the resolver on a transient failure (the resolver simply doesn't call it).
    pub async fn set_catalog_mapping(
        &self,
        id: i32,
        catalog_id: i32,
        status: &str,
        total_eps: Option<i32>,
    ) -> Result<(), sea_orm::DbErr> {
        if let Some(model) = show::Entity::find_by_id(id).one(self.db).await? {
            let mut active: show::ActiveModel = model.into();
            active.catalog_id = Set(Some(catalog_id));
            active.status = Set(status.to_string());
            active.total_eps = Set(total_eps);
            active.update(self.db).await?;
        }
        Ok(())
    }

    pub async fn set_ep_offset(&self, id: i32, ep_offset: i32) -> Result<(), sea_orm::DbErr> {
        if let Some(model) = show::Entity::find_by_id(id).one(self.db).await? {
            let mut active: show::ActiveModel = model.into();
            active.ep_offset = Set(ep_offset);
            active.update(self.db).await?;
        }
        Ok(())
    }

    pub async fn aliases(&self, show_id: i32) -> Result<Vec<String>, sea_orm::DbErr> {
        let rows = show_alias::Entity::find()
            .filter(show_alias::Column::ShowId.eq(show_id))
            .all(self.db)
            .await?;
        Ok(rows.into_iter().map(|r| r.alias).collect())
    }

    pub async fn add_alias(&self, show_id: i32, alias: &str) -> Result<(), sea_orm::DbErr> {
        let existing = show_alias::Entity::find()
            .filter(show_alias::Column::ShowId.eq(show_id))
            .filter(show_alias::Column::Alias.eq(alias))
            .one(self.db)
            .await?;
        if existing.is_some() {
            return Ok(());
        }
        let active = show_alias::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            show_id: Set(show_id),
            alias: Set(alias.to_string()),
        };
        active.insert(self.db).await?;
        Ok(())
    }

    pub async fn profile(&self, show_id: i32) -> Result<show_profile::Model, sea_orm::DbErr> {
        if let Some(existing) = show_profile::Entity::find()
            .filter(show_profile::Column::ShowId.eq(show_id))
            .one(self.db)
            .await?
        {
            return Ok(existing);
        }
        let active = show_profile::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            show_id: Set(show_id),
            preferred_subgroups: Set("[]".to_string()),
            min_score: Set(show_profile::DEFAULT_MIN_SCORE),
        };
        active.insert(self.db).await
    }

    pub async fn set_profile(
        &self,
        show_id: i32,
        preferred_subgroups: &[String],
        min_score: i32,
    ) -> Result<(), sea_orm::DbErr> {
        let current = self.profile(show_id).await?;
        let mut active: show_profile::ActiveModel = current.into();
        active.preferred_subgroups =
            Set(serde_json::to_string(preferred_subgroups).unwrap_or_else(|_| "[]".to_string()));
        active.min_score = Set(min_score);
        active.update(self.db).await?;
        Ok(())
    }
}
