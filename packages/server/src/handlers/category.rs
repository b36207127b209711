use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use sea_orm::prelude::Expr;
use sea_orm::*;
use tracing::instrument;

use crate::entity::{
    archived_challenge, category, category_rating, challenge, sub_category, sub_category_rating,
    user,
};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::{AppJson, AppQuery};
use crate::models::category::*;
use crate::models::shared::{Pagination, page_params};
use crate::state::AppState;

fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Categories",
    operation_id = "listCategories",
    summary = "List categories",
    description = "Returns every category with its subcategories, ordered by name.",
    responses(
        (status = 200, description = "All categories", body = Vec<CategoryResponse>),
    ),
)]
#[instrument(skip(state))]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryResponse>>, AppError> {
    let categories = category::Entity::find()
        .order_by_asc(category::Column::Name)
        .all(&state.db)
        .await?;

    let mut subs: HashMap<i32, Vec<sub_category::Model>> = HashMap::new();
    for sub in sub_category::Entity::find()
        .order_by_asc(sub_category::Column::Name)
        .all(&state.db)
        .await?
    {
        subs.entry(sub.category_id).or_default().push(sub);
    }

    let data = categories
        .into_iter()
        .map(|c| {
            let children = subs.remove(&c.id).unwrap_or_default();
            CategoryResponse::new(c, children)
        })
        .collect();
    Ok(Json(data))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Categories",
    operation_id = "getCategory",
    summary = "Get a category",
    params(("id" = i32, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category with subcategories", body = CategoryResponse),
        (status = 404, description = "Category not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(id))]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<CategoryResponse>, AppError> {
    let model = find_category(&state.db, id).await?;
    let subs = list_subs(&state.db, id).await?;
    Ok(Json(CategoryResponse::new(model, subs)))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Categories",
    operation_id = "createCategory",
    summary = "Create a category",
    description = "Requires `category:manage` permission. Category names are unique.",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = CategoryResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 409, description = "Name already used (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(name = %payload.name))]
pub async fn create_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("category:manage")?;
    validate_create_category(&payload)?;

    let name = payload.name.trim().to_string();
    let model = category::ActiveModel {
        name: Set(name.clone()),
        description: Set(payload.description),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Category '{name}' already exists"))
        } else {
            e.into()
        }
    })?;

    Ok((
        StatusCode::CREATED,
        Json(CategoryResponse::new(model, Vec::new())),
    ))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Categories",
    operation_id = "updateCategory",
    summary = "Update a category",
    description = "Partial update. Requires `category:manage` permission.",
    params(("id" = i32, Path, description = "Category ID")),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = CategoryResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Category not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Name already used (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(id))]
pub async fn update_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateCategoryRequest>,
) -> Result<Json<CategoryResponse>, AppError> {
    auth_user.require_permission("category:manage")?;
    validate_update_category(&payload)?;

    let existing = find_category(&state.db, id).await?;
    let model = if payload == UpdateCategoryRequest::default() {
        existing
    } else {
        let mut active: category::ActiveModel = existing.into();
        if let Some(ref name) = payload.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = payload.description {
            active.description = Set(description);
        }
        active.update(&state.db).await.map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("A category with this name already exists".into())
            } else {
                e.into()
            }
        })?
    };

    let subs = list_subs(&state.db, id).await?;
    Ok(Json(CategoryResponse::new(model, subs)))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Categories",
    operation_id = "deleteCategory",
    summary = "Delete a category",
    description = "Deletes the category, its subcategories and all ratings in them. Archived challenges keep their copied names. Refused with 409 while live challenges still use the category. Requires `category:manage` permission.",
    params(("id" = i32, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Category not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Category still has live challenges (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("category:manage")?;

    let txn = state.db.begin().await?;
    find_category(&txn, id).await?;

    let live = challenge::Entity::find()
        .filter(challenge::Column::CategoryId.eq(id))
        .count(&txn)
        .await?;
    if live > 0 {
        return Err(AppError::Conflict(format!(
            "Category still has {live} live challenge(s)"
        )));
    }

    let sub_ids: Vec<i32> = sub_category::Entity::find()
        .select_only()
        .column(sub_category::Column::Id)
        .filter(sub_category::Column::CategoryId.eq(id))
        .into_tuple()
        .all(&txn)
        .await?;
    for sub_id in sub_ids {
        detach_sub_category(&txn, sub_id).await?;
    }

    category_rating::Entity::delete_many()
        .filter(category_rating::Column::CategoryId.eq(id))
        .exec(&txn)
        .await?;
    archived_challenge::Entity::update_many()
        .col_expr(
            archived_challenge::Column::CategoryId,
            Expr::value(Option::<i32>::None),
        )
        .filter(archived_challenge::Column::CategoryId.eq(id))
        .exec(&txn)
        .await?;
    category::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/subcategories",
    tag = "Categories",
    operation_id = "createSubCategory",
    summary = "Create a subcategory",
    description = "Subcategory names are unique within their category. Requires `category:manage` permission.",
    params(("id" = i32, Path, description = "Category ID")),
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Subcategory created", body = SubCategoryResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Category not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Name already used in this category (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(category_id))]
pub async fn create_sub_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(category_id): Path<i32>,
    AppJson(payload): AppJson<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("category:manage")?;
    validate_create_category(&payload)?;
    find_category(&state.db, category_id).await?;

    let name = payload.name.trim().to_string();
    let model = sub_category::ActiveModel {
        category_id: Set(category_id),
        name: Set(name.clone()),
        description: Set(payload.description),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Subcategory '{name}' already exists in this category"))
        } else {
            e.into()
        }
    })?;

    Ok((StatusCode::CREATED, Json(SubCategoryResponse::from(model))))
}

#[utoipa::path(
    patch,
    path = "/{id}/subcategories/{sub_id}",
    tag = "Categories",
    operation_id = "updateSubCategory",
    summary = "Update a subcategory",
    description = "Partial update. Requires `category:manage` permission.",
    params(
        ("id" = i32, Path, description = "Category ID"),
        ("sub_id" = i32, Path, description = "Subcategory ID"),
    ),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Subcategory updated", body = SubCategoryResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Subcategory not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Name already used in this category (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(category_id, sub_id))]
pub async fn update_sub_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((category_id, sub_id)): Path<(i32, i32)>,
    AppJson(payload): AppJson<UpdateCategoryRequest>,
) -> Result<Json<SubCategoryResponse>, AppError> {
    auth_user.require_permission("category:manage")?;
    validate_update_category(&payload)?;

    let existing = find_sub_category(&state.db, category_id, sub_id).await?;
    if payload == UpdateCategoryRequest::default() {
        return Ok(Json(existing.into()));
    }

    let mut active: sub_category::ActiveModel = existing.into();
    if let Some(ref name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    let model = active.update(&state.db).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("A subcategory with this name already exists in this category".into())
        } else {
            e.into()
        }
    })?;

    Ok(Json(model.into()))
}

#[utoipa::path(
    delete,
    path = "/{id}/subcategories/{sub_id}",
    tag = "Categories",
    operation_id = "deleteSubCategory",
    summary = "Delete a subcategory",
    description = "Deletes the subcategory and its ratings. Live challenges in it fall back to the parent category only. Requires `category:manage` permission.",
    params(
        ("id" = i32, Path, description = "Category ID"),
        ("sub_id" = i32, Path, description = "Subcategory ID"),
    ),
    responses(
        (status = 204, description = "Subcategory deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Subcategory not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(category_id, sub_id))]
pub async fn delete_sub_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((category_id, sub_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("category:manage")?;

    let txn = state.db.begin().await?;
    find_sub_category(&txn, category_id, sub_id).await?;
    detach_sub_category(&txn, sub_id).await?;
    txn.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/leaderboard",
    tag = "Leaderboards",
    operation_id = "getCategoryLeaderboard",
    summary = "Category leaderboard",
    description = "Ratings in the category, highest first; equal ratings are ordered by user id.",
    params(("id" = i32, Path, description = "Category ID"), LeaderboardQuery),
    responses(
        (status = 200, description = "Leaderboard page", body = LeaderboardResponse),
        (status = 404, description = "Category not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query), fields(id))]
pub async fn category_leaderboard(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppQuery(query): AppQuery<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    find_category(&state.db, id).await?;
    let (page, per_page) = page_params(query.page, query.per_page);

    let total = category_rating::Entity::find()
        .filter(category_rating::Column::CategoryId.eq(id))
        .count(&state.db)
        .await?;
    let pagination = Pagination::new(page, per_page, total);

    let rows = category_rating::Entity::find()
        .filter(category_rating::Column::CategoryId.eq(id))
        .find_also_related(user::Entity)
        .order_by_desc(category_rating::Column::Rating)
        .order_by_asc(category_rating::Column::UserId)
        .offset(Some(pagination.offset()))
        .limit(Some(per_page))
        .all(&state.db)
        .await?;

    let data = rows
        .into_iter()
        .map(|(r, u)| (r.user_id, u, r.rating, r.challenges_played))
        .enumerate()
        .map(|(i, row)| leaderboard_entry(pagination.offset() + i as u64 + 1, row))
        .collect();

    Ok(Json(LeaderboardResponse { data, pagination }))
}

#[utoipa::path(
    get,
    path = "/{id}/subcategories/{sub_id}/leaderboard",
    tag = "Leaderboards",
    operation_id = "getSubCategoryLeaderboard",
    summary = "Subcategory leaderboard",
    description = "Ratings in the subcategory, highest first; equal ratings are ordered by user id.",
    params(
        ("id" = i32, Path, description = "Category ID"),
        ("sub_id" = i32, Path, description = "Subcategory ID"),
        LeaderboardQuery,
    ),
    responses(
        (status = 200, description = "Leaderboard page", body = LeaderboardResponse),
        (status = 404, description = "Subcategory not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query), fields(category_id, sub_id))]
pub async fn sub_category_leaderboard(
    State(state): State<AppState>,
    Path((category_id, sub_id)): Path<(i32, i32)>,
    AppQuery(query): AppQuery<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    find_sub_category(&state.db, category_id, sub_id).await?;
    let (page, per_page) = page_params(query.page, query.per_page);

    let total = sub_category_rating::Entity::find()
        .filter(sub_category_rating::Column::SubCategoryId.eq(sub_id))
        .count(&state.db)
        .await?;
    let pagination = Pagination::new(page, per_page, total);

    let rows = sub_category_rating::Entity::find()
        .filter(sub_category_rating::Column::SubCategoryId.eq(sub_id))
        .find_also_related(user::Entity)
        .order_by_desc(sub_category_rating::Column::Rating)
        .order_by_asc(sub_category_rating::Column::UserId)
        .offset(Some(pagination.offset()))
        .limit(Some(per_page))
        .all(&state.db)
        .await?;

    let data = rows
        .into_iter()
        .map(|(r, u)| (r.user_id, u, r.rating, r.challenges_played))
        .enumerate()
        .map(|(i, row)| leaderboard_entry(pagination.offset() + i as u64 + 1, row))
        .collect();

    Ok(Json(LeaderboardResponse { data, pagination }))
}

fn leaderboard_entry(
    rank: u64,
    (user_id, user, rating, challenges_played): (i32, Option<user::Model>, i32, i32),
) -> LeaderboardEntry {
    LeaderboardEntry {
        rank,
        user_id,
        username: user.map(|u| u.username).unwrap_or_default(),
        rating,
        challenges_played,
    }
}

/// Remove a subcategory, its ratings and every reference to it.
async fn detach_sub_category<C: ConnectionTrait>(db: &C, sub_id: i32) -> Result<(), DbErr> {
    challenge::Entity::update_many()
        .col_expr(
            challenge::Column::SubCategoryId,
            Expr::value(Option::<i32>::None),
        )
        .filter(challenge::Column::SubCategoryId.eq(sub_id))
        .exec(db)
        .await?;
    sub_category_rating::Entity::delete_many()
        .filter(sub_category_rating::Column::SubCategoryId.eq(sub_id))
        .exec(db)
        .await?;
    archived_challenge::Entity::update_many()
        .col_expr(
            archived_challenge::Column::SubCategoryId,
            Expr::value(Option::<i32>::None),
        )
        .filter(archived_challenge::Column::SubCategoryId.eq(sub_id))
        .exec(db)
        .await?;
    sub_category::Entity::delete_by_id(sub_id).exec(db).await?;
    Ok(())
}

async fn find_category<C: ConnectionTrait>(db: &C, id: i32) -> Result<category::Model, AppError> {
    category::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".into()))
}

/// A subcategory that exists *and* belongs to `category_id`.
pub(crate) async fn find_sub_category<C: ConnectionTrait>(
    db: &C,
    category_id: i32,
    sub_id: i32,
) -> Result<sub_category::Model, AppError> {
    sub_category::Entity::find_by_id(sub_id)
        .filter(sub_category::Column::CategoryId.eq(category_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Subcategory not found".into()))
}

async fn list_subs<C: ConnectionTrait>(
    db: &C,
    category_id: i32,
) -> Result<Vec<sub_category::Model>, AppError> {
    Ok(sub_category::Entity::find()
        .filter(sub_category::Column::CategoryId.eq(category_id))
        .order_by_asc(sub_category::Column::Name)
        .all(db)
        .await?)
}
