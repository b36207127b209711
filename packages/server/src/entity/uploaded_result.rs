use common::ResultKind;
use sea_orm::entity::prelude::*;

/// A participant's submission. At most one per participant per challenge.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "uploaded_result")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "challenge_user_result")]
    pub challenge_id: i32,
    #[sea_orm(belongs_to, from = "challenge_id", to = "id", on_delete = "Cascade")]
    pub challenge: HasOne<super::challenge::Entity>,

    #[sea_orm(unique_key = "challenge_user_result")]
    pub user_id: i32,
    #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "Cascade")]
    pub user: HasOne<super::user::Entity>,

    pub kind: ResultKind,

    /// Set for `url` results.
    #[sea_orm(column_type = "Text", nullable)]
    pub url: Option<String>,
    /// Set for `text` results.
    #[sea_orm(column_type = "Text", nullable)]
    pub text: Option<String>,

    /// Blob store hash; set for `file` results.
    #[sea_orm(indexed)]
    pub content_hash: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<i64>,

    pub submitted_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
