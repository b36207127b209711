use sea_orm::entity::prelude::*;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "challenge")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String, // in Markdown

    #[sea_orm(indexed)]
    pub category_id: i32,
    #[sea_orm(belongs_to, from = "category_id", to = "id", on_delete = "Cascade")]
    pub category: HasOne<super::category::Entity>,

    pub sub_category_id: Option<i32>,
    #[sea_orm(belongs_to, from = "sub_category_id", to = "id", on_delete = "SetNull")]
    pub sub_category: HasOne<super::sub_category::Entity>,

    /// NULL once the creating account is deleted.
    pub creator_id: Option<i32>,
    #[sea_orm(belongs_to, from = "creator_id", to = "id", on_delete = "SetNull")]
    pub creator: HasOne<super::user::Entity>,

    /// Joining and uploads close here; voting opens.
    #[sea_orm(indexed)]
    pub end_date: DateTimeUtc,
    /// Voting closes here; the challenge becomes eligible for resolution.
    #[sea_orm(indexed)]
    pub vote_period_end: DateTimeUtc,

    #[sea_orm(has_many)]
    pub participants: HasMany<super::challenge_user::Entity>,

    #[sea_orm(has_many)]
    pub results: HasMany<super::uploaded_result::Entity>,

    #[sea_orm(default_value = false)]
    pub reminder_sent: bool,
    #[sea_orm(default_value = false)]
    pub voting_notice_sent: bool,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
