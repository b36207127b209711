use chrono::{DateTime, Utc};
use common::ResultKind;
use serde::{Deserialize, Serialize};

use crate::entity::uploaded_result;
use crate::error::AppError;

const MAX_URL_LEN: usize = 2048;
const MAX_TEXT_LEN: usize = 10_000;

/// Body for a `url` or `text` result. Files go through the multipart endpoint.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct SubmitResultRequest {
    #[schema(example = "url")]
    pub kind: ResultKind,
    #[schema(example = "https://www.strava.com/activities/123")]
    pub url: Option<String>,
    pub text: Option<String>,
}

/// Validated content of a JSON result submission.
#[derive(Debug, PartialEq, Eq)]
pub enum ResultContent {
    Url(String),
    Text(String),
}

pub fn validate_submit_result(req: &SubmitResultRequest) -> Result<ResultContent, AppError> {
    match req.kind {
        ResultKind::Url => {
            let url = req.url.as_deref().map(str::trim).unwrap_or_default();
            if url.is_empty() || url.len() > MAX_URL_LEN {
                return Err(AppError::Validation(format!(
                    "url must be 1-{MAX_URL_LEN} characters"
                )));
            }
            let rest = url
                .strip_prefix("https://")
                .or_else(|| url.strip_prefix("http://"))
                .ok_or_else(|| AppError::Validation("url must start with http:// or https://".into()))?;
            if rest.is_empty() || url.chars().any(|c| c.is_whitespace() || c.is_control()) {
                return Err(AppError::Validation("url is not a valid address".into()));
            }
            Ok(ResultContent::Url(url.to_string()))
        }
        ResultKind::Text => {
            let text = req.text.as_deref().unwrap_or_default();
            if text.trim().is_empty() || text.chars().count() > MAX_TEXT_LEN {
                return Err(AppError::Validation(format!(
                    "text must be 1-{MAX_TEXT_LEN} characters"
                )));
            }
            Ok(ResultContent::Text(text.to_string()))
        }
        ResultKind::File => Err(AppError::Validation(
            "File results must be sent as multipart to /upload".into(),
        )),
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ResultResponse {
    #[schema(example = 31)]
    pub id: i32,
    pub challenge_id: i32,
    pub user_id: i32,
    #[schema(example = "alice_wonder")]
    pub username: String,
    pub kind: ResultKind,
    pub url: Option<String>,
    pub text: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<i64>,
    /// Vote count; null until the challenge has finished.
    pub votes: Option<u64>,
    pub submitted_at: DateTime<Utc>,
}

impl ResultResponse {
    pub fn new(m: uploaded_result::Model, username: String, votes: Option<u64>) -> Self {
        Self {
            id: m.id,
            challenge_id: m.challenge_id,
            user_id: m.user_id,
            username,
            kind: m.kind,
            url: m.url,
            text: m.text,
            filename: m.filename,
            content_type: m.content_type,
            size: m.size,
            votes,
            submitted_at: m.submitted_at,
        }
    }
}
