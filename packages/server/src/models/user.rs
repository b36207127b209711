use chrono::{DateTime, Utc};
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

use super::account::{validate_email, validate_password};
use super::shared::Pagination;
use crate::error::AppError;

#[derive(Deserialize, utoipa::IntoParams)]
pub struct UserListQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 20)]
    pub per_page: Option<u64>,
    /// Case-insensitive substring match on username.
    #[param(example = "ali")]
    pub search: Option<String>,
}

#[derive(Serialize, FromQueryResult, utoipa::ToSchema)]
pub struct UserListItem {
    #[schema(example = 42)]
    pub id: i32,
    #[schema(example = "alice_wonder")]
    pub username: String,
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[schema(example = "member")]
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UserListResponse {
    pub data: Vec<UserListItem>,
    pub pagination: Pagination,
}

/// Request body for `PATCH /users/me`. Changing the password needs `current_password`.
#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateMeRequest {
    #[schema(example = "alice@new.example.com")]
    pub email: Option<String>,
    pub password: Option<String>,
    pub current_password: Option<String>,
}

pub fn validate_update_me(req: &UpdateMeRequest) -> Result<(), AppError> {
    if let Some(ref email) = req.email {
        validate_email(email.trim())?;
    }
    if let Some(ref password) = req.password {
        validate_password(password)?;
        if req.current_password.as_deref().unwrap_or_default().is_empty() {
            return Err(AppError::Validation(
                "current_password is required to change the password".into(),
            ));
        }
    }
    Ok(())
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct SetRoleRequest {
    #[schema(example = "moderator")]
    pub role: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct UserRoleResponse {
    pub id: i32,
    pub username: String,
    pub role: String,
}

/// A user's standing in one category.
#[derive(Serialize, FromQueryResult, utoipa::ToSchema)]
pub struct CategoryRatingEntry {
    #[schema(example = 3)]
    pub category_id: i32,
    #[schema(example = "Running")]
    pub category_name: String,
    #[schema(example = 1216)]
    pub rating: i32,
    #[schema(example = 4)]
    pub challenges_played: i32,
}

/// A user's standing in one subcategory.
#[derive(Serialize, FromQueryResult, utoipa::ToSchema)]
pub struct SubCategoryRatingEntry {
    #[schema(example = 8)]
    pub sub_category_id: i32,
    #[schema(example = "5K")]
    pub sub_category_name: String,
    #[schema(example = 3)]
    pub category_id: i32,
    #[schema(example = 1184)]
    pub rating: i32,
    #[schema(example = 2)]
    pub challenges_played: i32,
}

/// Public profile of a user.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UserProfileResponse {
    #[schema(example = 42)]
    pub id: i32,
    #[schema(example = "alice_wonder")]
    pub username: String,
    pub has_avatar: bool,
    pub created_at: DateTime<Utc>,
    pub category_ratings: Vec<CategoryRatingEntry>,
    pub sub_category_ratings: Vec<SubCategoryRatingEntry>,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct HistoryQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 20)]
    pub per_page: Option<u64>,
}

/// One archived challenge the user took part in.
#[derive(Serialize, utoipa::ToSchema)]
pub struct HistoryItem {
    #[schema(example = 12)]
    pub archived_challenge_id: i32,
    #[schema(example = "Fastest 5K of March")]
    pub title: String,
    #[schema(example = "Running")]
    pub category_name: String,
    pub sub_category_name: Option<String>,
    pub participant_count: i32,
    /// Null when the user did not upload a result.
    pub placement: Option<i32>,
    pub votes: i32,
    pub category_rating_delta: Option<i32>,
    pub sub_category_rating_delta: Option<i32>,
    pub archived_at: DateTime<Utc>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HistoryResponse {
    pub data: Vec<HistoryItem>,
    pub pagination: Pagination,
}
