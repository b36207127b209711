use sea_orm::entity::prelude::*;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "archived_challenge_user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(indexed)]
    pub archived_challenge_id: i32,
    #[sea_orm(belongs_to, from = "archived_challenge_id", to = "id", on_delete = "Cascade")]
    pub archived_challenge: HasOne<super::archived_challenge::Entity>,

    #[sea_orm(indexed)]
    pub user_id: Option<i32>,
    #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "SetNull")]
    pub user: HasOne<super::user::Entity>,
    pub username: String,

    /// NULL for participants who never uploaded a result.
    pub placement: Option<i32>,
    pub votes: i32,

    pub category_rating_before: Option<i32>,
    pub category_rating_after: Option<i32>,
    pub category_rating_delta: Option<i32>,
    pub sub_category_rating_before: Option<i32>,
    pub sub_category_rating_after: Option<i32>,
    pub sub_category_rating_delta: Option<i32>,
}

impl ActiveModelBehavior for ActiveModel {}
