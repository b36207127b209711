use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::shared::{Pagination, validate_description, validate_name};
use crate::entity::{category, sub_category};
use crate::error::AppError;

const MAX_DESCRIPTION: usize = 10_000;

/// Body for creating a category or a subcategory.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateCategoryRequest {
    #[schema(example = "Running")]
    pub name: String,
    #[serde(default)]
    #[schema(example = "Timed runs of any distance.")]
    pub description: String,
}

#[derive(Deserialize, Default, PartialEq, utoipa::ToSchema)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub fn validate_create_category(req: &CreateCategoryRequest) -> Result<(), AppError> {
    validate_name(&req.name)?;
    validate_description(&req.description, MAX_DESCRIPTION)
}

pub fn validate_update_category(req: &UpdateCategoryRequest) -> Result<(), AppError> {
    if let Some(ref name) = req.name {
        validate_name(name)?;
    }
    if let Some(ref description) = req.description {
        validate_description(description, MAX_DESCRIPTION)?;
    }
    Ok(())
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SubCategoryResponse {
    #[schema(example = 8)]
    pub id: i32,
    #[schema(example = 3)]
    pub category_id: i32,
    #[schema(example = "5K")]
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<sub_category::Model> for SubCategoryResponse {
    fn from(m: sub_category::Model) -> Self {
        Self {
            id: m.id,
            category_id: m.category_id,
            name: m.name,
            description: m.description,
            created_at: m.created_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct CategoryResponse {
    #[schema(example = 3)]
    pub id: i32,
    #[schema(example = "Running")]
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub sub_categories: Vec<SubCategoryResponse>,
}

impl CategoryResponse {
    pub fn new(m: category::Model, subs: Vec<sub_category::Model>) -> Self {
        Self {
            id: m.id,
            name: m.name,
            description: m.description,
            created_at: m.created_at,
            sub_categories: subs.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct LeaderboardQuery {
    #[param(example = 1)]
    pub page: Option<u64>,
    #[param(example = 20)]
    pub per_page: Option<u64>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based position; ties in rating are broken by user id.
    #[schema(example = 1)]
    pub rank: u64,
    #[schema(example = 42)]
    pub user_id: i32,
    #[schema(example = "alice_wonder")]
    pub username: String,
    #[schema(example = 1248)]
    pub rating: i32,
    #[schema(example = 5)]
    pub challenges_played: i32,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct LeaderboardResponse {
    pub data: Vec<LeaderboardEntry>,
    pub pagination: Pagination,
}
