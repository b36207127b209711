use sea_orm::entity::prelude::*;

/// Snapshot of a resolved challenge. Names are copied so the row stays
/// readable after the category, subcategory or creator is deleted.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "archived_challenge")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Id the live challenge had; no longer references anything.
    #[sea_orm(unique)]
    pub original_challenge_id: i32,

    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub category_id: Option<i32>,
    #[sea_orm(belongs_to, from = "category_id", to = "id", on_delete = "SetNull")]
    pub category: HasOne<super::category::Entity>,
    pub category_name: String,

    pub sub_category_id: Option<i32>,
    #[sea_orm(belongs_to, from = "sub_category_id", to = "id", on_delete = "SetNull")]
    pub sub_category: HasOne<super::sub_category::Entity>,
    pub sub_category_name: Option<String>,

    pub creator_username: Option<String>,

    pub end_date: DateTimeUtc,
    pub vote_period_end: DateTimeUtc,

    pub participant_count: i32,
    /// Whether ratings were adjusted when this challenge resolved.
    pub rated: bool,

    #[sea_orm(has_many)]
    pub participants: HasMany<super::archived_challenge_user::Entity>,

    #[sea_orm(indexed)]
    pub archived_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
