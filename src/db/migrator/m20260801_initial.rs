use sea_orm::Schema;
use sea_orm_migration::prelude::*;

use crate::entities::{episode, release, show, show_alias, show_profile};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        let schema = Schema::new(backend);

        manager
            .create_table(schema.create_table_from_entity(show::Entity).if_not_exists().to_owned())
            .await?;
        manager
            .create_table(
                schema
                    .create_table_from_entity(show_alias::Entity)
                    .if_not_exists().to_owned(),
            )
            .await?;
        manager
            .create_table(
                schema
                    .create_table_from_entity(show_profile::Entity)
                    .if_not_exists().to_owned(),
            )
            .await?;
        manager
            .create_table(
                schema
                    .create_table_from_entity(episode::Entity)
                    .if_not_exists().to_owned(),
            )
            .await?;
        manager
            .create_table(
                schema
                    .create_table_from_entity(release::Entity)
                    .if_not_exists().to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_episode_show_epno")
                    .table(episode::Entity)
                    .col(episode::Column::ShowId)
                    .col(episode::Column::EpNo)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_release_show_ep_magnet")
                    .table(release::Entity)
                    .col(release::Column::ShowId)
                    .col(release::Column::EpNo)
                    .col(release::Column::MagnetOrTorrent)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(release::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(episode::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(show_profile::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(show_alias::Entity).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(show::Entity).to_owned())
            .await?;
        Ok(())
    }
}
