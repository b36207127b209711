use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::shared::Pagination;
use crate::entity::{archived_challenge, archived_challenge_user};

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ArchiveListQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 20)]
    pub per_page: Option<u64>,
    pub category_id: Option<i32>,
    pub sub_category_id: Option<i32>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ArchivedChallengeSummary {
    #[schema(example = 12)]
    pub id: i32,
    pub original_challenge_id: i32,
    #[schema(example = "Fastest 5K of March")]
    pub title: String,
    pub category_id: Option<i32>,
    #[schema(example = "Running")]
    pub category_name: String,
    pub sub_category_id: Option<i32>,
    pub sub_category_name: Option<String>,
    pub creator_username: Option<String>,
    pub end_date: DateTime<Utc>,
    pub vote_period_end: DateTime<Utc>,
    pub participant_count: i32,
    pub rated: bool,
    pub archived_at: DateTime<Utc>,
}

impl From<archived_challenge::Model> for ArchivedChallengeSummary {
    fn from(m: archived_challenge::Model) -> Self {
        Self {
            id: m.id,
            original_challenge_id: m.original_challenge_id,
            title: m.title,
            category_id: m.category_id,
            category_name: m.category_name,
            sub_category_id: m.sub_category_id,
            sub_category_name: m.sub_category_name,
            creator_username: m.creator_username,
            end_date: m.end_date,
            vote_period_end: m.vote_period_end,
            participant_count: m.participant_count,
            rated: m.rated,
            archived_at: m.archived_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ArchiveListResponse {
    pub data: Vec<ArchivedChallengeSummary>,
    pub pagination: Pagination,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ArchivedParticipantResponse {
    /// Null once the account has been deleted.
    pub user_id: Option<i32>,
    #[schema(example = "alice_wonder")]
    pub username: String,
    pub placement: Option<i32>,
    pub votes: i32,
    pub category_rating_before: Option<i32>,
    pub category_rating_after: Option<i32>,
    pub category_rating_delta: Option<i32>,
    pub sub_category_rating_before: Option<i32>,
    pub sub_category_rating_after: Option<i32>,
    pub sub_category_rating_delta: Option<i32>,
}

impl From<archived_challenge_user::Model> for ArchivedParticipantResponse {
    fn from(m: archived_challenge_user::Model) -> Self {
        Self {
            user_id: m.user_id,
            username: m.username,
            placement: m.placement,
            votes: m.votes,
            category_rating_before: m.category_rating_before,
            category_rating_after: m.category_rating_after,
            category_rating_delta: m.category_rating_delta,
            sub_category_rating_before: m.sub_category_rating_before,
            sub_category_rating_after: m.sub_category_rating_after,
            sub_category_rating_delta: m.sub_category_rating_delta,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ArchivedChallengeResponse {
    #[serde(flatten)]
    pub challenge: ArchivedChallengeSummary,
    pub description: String,
    /// Ranked participants first by placement, then unranked ones by name.
    pub participants: Vec<ArchivedParticipantResponse>,
}
