use sea_orm::entity::prelude::*;

/// Prefix of `client_key` for votes cast with a bearer token.
pub const USER_KEY_PREFIX: &str = "user:";
/// Prefix of `client_key` for votes identified only by `X-Client-Id`.
pub const ANON_KEY_PREFIX: &str = "anon:";

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "vote")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// One vote per `client_key` per challenge.
    #[sea_orm(unique_key = "challenge_client")]
    pub challenge_id: i32,
    #[sea_orm(belongs_to, from = "challenge_id", to = "id", on_delete = "Cascade")]
    pub challenge: HasOne<super::challenge::Entity>,

    #[sea_orm(indexed)]
    pub uploaded_result_id: i32,
    #[sea_orm(belongs_to, from = "uploaded_result_id", to = "id", on_delete = "Cascade")]
    pub uploaded_result: HasOne<super::uploaded_result::Entity>,

    /// NULL for anonymous votes.
    pub user_id: Option<i32>,
    #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "Cascade")]
    pub user: HasOne<super::user::Entity>,

    #[sea_orm(unique_key = "challenge_client")]
    pub client_key: String,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
