use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "shows")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title_input: String,
    #[sea_orm(unique)]
    pub title_canonical: String,
    pub catalog_id: Option<i32>,
    pub status: String,
    pub total_eps: Option<i32>,
    pub ep_offset: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::show_alias::Entity")]
    Aliases,
    #[sea_orm(has_one = "super::show_profile::Entity")]
    Profile,
    #[sea_orm(has_many = "super::episode::Entity")]
    Episodes,
    #[sea_orm(has_many = "super::release::Entity")]
    Releases,
}

impl Related<super::show_alias::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Aliases.def()
    }
}

impl Related<super::show_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profile.def()
    }
}

impl Related<super::episode::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Episodes.def()
    }
}

impl Related<super::release::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Releases.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Lifecycle status of a tracked show, mirrored from the catalog's airing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowStatus {
    Planned,
    Airing,
    Finished,
}

impl ShowStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Airing => "airing",
            Self::Finished => "finished",
        }
    }
}

impl std::str::FromStr for ShowStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "airing" => Ok(Self::Airing),
            "finished" => Ok(Self::Finished),
            _ => Err(()),
        }
    }
}
