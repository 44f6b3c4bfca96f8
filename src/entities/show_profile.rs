use sea_orm::entity::prelude::*;

/// One per show. `preferred_subgroups` is stored as a JSON array of strings
/// so ordering (first-listed = most preferred) is preserved.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "show_profiles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub show_id: i32,
    pub preferred_subgroups: String,
    pub min_score: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::show::Entity",
        from = "Column::ShowId",
        to = "super::show::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Show,
}

impl Related<super::show::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Show.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

pub const DEFAULT_MIN_SCORE: i32 = 70;

impl Model {
    #[must_use]
    pub fn subgroups(&self) -> Vec<String> {
        serde_json::from_str(&self.preferred_subgroups).unwrap_or_default()
    }
}
