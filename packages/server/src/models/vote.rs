use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::vote;
use crate::error::AppError;

/// Header carrying the anonymous voter's client identity.
pub const CLIENT_ID_HEADER: &str = "X-Client-Id";

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CastVoteRequest {
    #[schema(example = 31)]
    pub uploaded_result_id: i32,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct VoteResponse {
    pub id: i32,
    pub challenge_id: i32,
    pub uploaded_result_id: i32,
    pub created_at: DateTime<Utc>,
}

impl From<vote::Model> for VoteResponse {
    fn from(m: vote::Model) -> Self {
        Self {
            id: m.id,
            challenge_id: m.challenge_id,
            uploaded_result_id: m.uploaded_result_id,
            created_at: m.created_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct MyVoteResponse {
    /// The result the caller voted for, or null.
    pub uploaded_result_id: Option<i32>,
}

/// `X-Client-Id` must be 1-128 printable ASCII characters.
pub fn validate_client_id(raw: &str) -> Result<(), AppError> {
    if raw.is_empty() || raw.len() > 128 || !raw.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(AppError::Validation(format!(
            "{CLIENT_ID_HEADER} must be 1-128 printable ASCII characters"
        )));
    }
    Ok(())
}

pub fn user_client_key(user_id: i32) -> String {
    format!("{}{user_id}", vote::USER_KEY_PREFIX)
}

pub fn anonymous_client_key(client_id: &str) -> String {
    format!("{}{client_id}", vote::ANON_KEY_PREFIX)
}
