use chrono::{DateTime, Utc};
use common::ChallengePhase;
use serde::{Deserialize, Serialize};

use super::shared::{Pagination, double_option, validate_description, validate_title};
use crate::entity::challenge;
use crate::error::AppError;

const MAX_DESCRIPTION: usize = 100_000;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateChallengeRequest {
    #[schema(example = "Fastest 5K of March")]
    pub title: String,
    /// Markdown.
    #[serde(default)]
    pub description: String,
    #[schema(example = 3)]
    pub category_id: i32,
    /// Must belong to `category_id`.
    #[schema(example = 8)]
    pub sub_category_id: Option<i32>,
    /// Joining and uploads close here.
    pub end_date: DateTime<Utc>,
    /// Voting closes here.
    pub vote_period_end: DateTime<Utc>,
}

pub fn validate_create_challenge(req: &CreateChallengeRequest) -> Result<(), AppError> {
    validate_title(&req.title)?;
    validate_description(&req.description, MAX_DESCRIPTION)
}

/// Partial update. `sub_category_id: null` detaches the subcategory.
#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateChallengeRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i32>)]
    pub sub_category_id: Option<Option<i32>>,
    pub end_date: Option<DateTime<Utc>>,
    pub vote_period_end: Option<DateTime<Utc>>,
}

pub fn validate_update_challenge(req: &UpdateChallengeRequest) -> Result<(), AppError> {
    if let Some(ref title) = req.title {
        validate_title(title)?;
    }
    if let Some(ref description) = req.description {
        validate_description(description, MAX_DESCRIPTION)?;
    }
    Ok(())
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ChallengeListQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 20)]
    pub per_page: Option<u64>,
    pub category_id: Option<i32>,
    pub sub_category_id: Option<i32>,
    /// Only challenges currently in this phase.
    pub phase: Option<ChallengePhase>,
    /// Case-insensitive substring match on title.
    pub search: Option<String>,
    /// Only challenges the caller has joined (requires authentication).
    pub joined: Option<bool>,
    /// Sort field: `created_at` (default), `end_date`, `vote_period_end`, `title`.
    #[param(example = "end_date")]
    pub sort_by: Option<String>,
    /// Sort direction: `asc` or `desc` (default).
    #[param(example = "asc")]
    pub sort_order: Option<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ChallengeResponse {
    #[schema(example = 17)]
    pub id: i32,
    #[schema(example = "Fastest 5K of March")]
    pub title: String,
    pub description: String,
    pub category_id: i32,
    pub sub_category_id: Option<i32>,
    pub creator_id: Option<i32>,
    pub creator_username: Option<String>,
    pub end_date: DateTime<Utc>,
    pub vote_period_end: DateTime<Utc>,
    pub phase: ChallengePhase,
    pub participant_count: u64,
    pub result_count: u64,
    /// Whether the caller has joined; omitted for anonymous requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joined: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ChallengeListItem {
    #[schema(example = 17)]
    pub id: i32,
    #[schema(example = "Fastest 5K of March")]
    pub title: String,
    pub category_id: i32,
    pub sub_category_id: Option<i32>,
    pub creator_id: Option<i32>,
    pub end_date: DateTime<Utc>,
    pub vote_period_end: DateTime<Utc>,
    pub phase: ChallengePhase,
    pub created_at: DateTime<Utc>,
}

impl ChallengeListItem {
    pub fn new(m: challenge::Model, now: DateTime<Utc>) -> Self {
        Self {
            phase: common::phase::phase_at(m.end_date, m.vote_period_end, now),
            id: m.id,
            title: m.title,
            category_id: m.category_id,
            sub_category_id: m.sub_category_id,
            creator_id: m.creator_id,
            end_date: m.end_date,
            vote_period_end: m.vote_period_end,
            created_at: m.created_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ChallengeListResponse {
    pub data: Vec<ChallengeListItem>,
    pub pagination: Pagination,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ParticipantResponse {
    #[schema(example = 42)]
    pub user_id: i32,
    #[schema(example = "alice_wonder")]
    pub username: String,
    pub joined_at: DateTime<Utc>,
    pub has_result: bool,
}
