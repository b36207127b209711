use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use axum::response::{IntoResponse, Response};
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr};
use sea_orm::*;
use tracing::instrument;

use crate::entity::{
    archived_challenge, archived_challenge_user, category, category_rating, challenge,
    challenge_user, role, sub_category, sub_category_rating, uploaded_result, user, vote,
};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::{AppJson, AppQuery};
use crate::handlers::account::map_user_unique_violation;
use crate::models::shared::{Pagination, escape_like, page_params};
use crate::models::user::*;
use crate::services::challenge::delete_results_where;
use crate::state::AppState;
use crate::utils::hash;
use crate::utils::upload::{BlobMeta, build_blob_response, release_blobs, stream_field_to_store};

/// Avatars are capped well below the general upload limit.
pub const AVATAR_MAX_BYTES: u64 = 5 * 1024 * 1024;

#[utoipa::path(
    get,
    path = "/",
    tag = "Users",
    operation_id = "listUsers",
    summary = "List users",
    description = "Paginated user list ordered by id, with optional username search. Requires `user:manage` permission.",
    params(UserListQuery),
    responses(
        (status = 200, description = "List of users", body = UserListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query))]
pub async fn list_users(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<UserListQuery>,
) -> Result<Json<UserListResponse>, AppError> {
    auth_user.require_permission("user:manage")?;
    let (page, per_page) = page_params(query.page, query.per_page);

    let mut select = user::Entity::find();
    if let Some(ref search) = query.search {
        let term = escape_like(search.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(user::Column::Username)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }

    let total = select.clone().count(&state.db).await?;
    let pagination = Pagination::new(page, per_page, total);

    let data = select
        .select_only()
        .column(user::Column::Id)
        .column(user::Column::Username)
        .column(user::Column::Email)
        .column(user::Column::Role)
        .column(user::Column::CreatedAt)
        .order_by_asc(user::Column::Id)
        .offset(Some(pagination.offset()))
        .limit(Some(per_page))
        .into_model::<UserListItem>()
        .all(&state.db)
        .await?;

    Ok(Json(UserListResponse { data, pagination }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Users",
    operation_id = "getUser",
    summary = "Public profile",
    description = "Returns a user's public profile with their category and subcategory ratings.",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User profile", body = UserProfileResponse),
        (status = 404, description = "User not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(id))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<UserProfileResponse>, AppError> {
    let model = find_user(&state.db, id).await?;

    let category_ratings = category_rating::Entity::find()
        .filter(category_rating::Column::UserId.eq(id))
        .find_also_related(category::Entity)
        .order_by_desc(category_rating::Column::Rating)
        .all(&state.db)
        .await?
        .into_iter()
        .filter_map(|(r, c)| {
            c.map(|c| CategoryRatingEntry {
                category_id: r.category_id,
                category_name: c.name,
                rating: r.rating,
                challenges_played: r.challenges_played,
            })
        })
        .collect();

    let sub_category_ratings = sub_category_rating::Entity::find()
        .filter(sub_category_rating::Column::UserId.eq(id))
        .find_also_related(sub_category::Entity)
        .order_by_desc(sub_category_rating::Column::Rating)
        .all(&state.db)
        .await?
        .into_iter()
        .filter_map(|(r, s)| {
            s.map(|s| SubCategoryRatingEntry {
                sub_category_id: r.sub_category_id,
                sub_category_name: s.name,
                category_id: s.category_id,
                rating: r.rating,
                challenges_played: r.challenges_played,
            })
        })
        .collect();

    Ok(Json(UserProfileResponse {
        id: model.id,
        username: model.username,
        has_avatar: model.avatar_hash.is_some(),
        created_at: model.created_at,
        category_ratings,
        sub_category_ratings,
    }))
}

#[utoipa::path(
    patch,
    path = "/me",
    tag = "Users",
    operation_id = "updateMe",
    summary = "Update own email or password",
    description = "Changes the caller's email and/or password. A password change must include `current_password`. An empty body returns 204 without changes.",
    request_body = UpdateMeRequest,
    responses(
        (status = 204, description = "Account updated"),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized or wrong current password (TOKEN_MISSING, TOKEN_INVALID, INVALID_CREDENTIALS)", body = ErrorBody),
        (status = 409, description = "Email already registered (EMAIL_TAKEN)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn update_me(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<UpdateMeRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_update_me(&payload)?;
    if payload == UpdateMeRequest::default() {
        return Ok(StatusCode::NO_CONTENT);
    }

    let existing = find_user(&state.db, auth_user.user_id).await?;
    let mut active: user::ActiveModel = existing.clone().into();

    if let Some(ref email) = payload.email {
        let email = email.trim().to_lowercase();
        let taken = user::Entity::find()
            .filter(user::Column::Email.eq(&email))
            .filter(user::Column::Id.ne(existing.id))
            .one(&state.db)
            .await?
            .is_some();
        if taken {
            return Err(AppError::EmailTaken);
        }
        active.email = Set(email);
    }

    if let Some(password) = payload.password {
        let current = payload.current_password.unwrap_or_default();
        let stored = existing.password.clone();
        let new_hash = tokio::task::spawn_blocking(move || {
            if !hash::verify_password(&current, &stored)? {
                return Ok(None);
            }
            hash::hash_password(&password).map(Some)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Hash task failed: {e}")))?
        .map_err(|e| AppError::Internal(format!("Password hash error: {e}")))?
        .ok_or(AppError::InvalidCredentials)?;
        active.password = Set(new_hash);
    }

    active
        .update(&state.db)
        .await
        .map_err(map_user_unique_violation)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/{id}/role",
    tag = "Users",
    operation_id = "setUserRole",
    summary = "Change a user's role",
    description = "Assigns one of the seeded roles. Takes effect at the user's next login. Requires `user:manage` permission.",
    params(("id" = i32, Path, description = "User ID")),
    request_body = SetRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UserRoleResponse),
        (status = 400, description = "Unknown role (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "User not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(id, role = %payload.role))]
pub async fn set_role(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<SetRoleRequest>,
) -> Result<Json<UserRoleResponse>, AppError> {
    auth_user.require_permission("user:manage")?;

    let role_name = payload.role.trim();
    if role::Entity::find_by_id(role_name.to_string())
        .one(&state.db)
        .await?
        .is_none()
    {
        return Err(AppError::Validation(format!("Unknown role '{role_name}'")));
    }

    let existing = find_user(&state.db, id).await?;
    let mut active: user::ActiveModel = existing.into();
    active.role = Set(role_name.to_string());
    let model = active.update(&state.db).await?;

    Ok(Json(UserRoleResponse {
        id: model.id,
        username: model.username,
        role: model.role,
    }))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Users",
    operation_id = "deleteUser",
    summary = "Delete an account",
    description = "Deletes the account with its participations, results, votes and ratings. Challenges it created stay but lose their creator; archived snapshots keep the username. Allowed for the account itself or with `user:manage` permission.",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "User not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_user(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    if auth_user.user_id != id {
        auth_user.require_permission("user:manage")?;
    }

    let txn = state.db.begin().await?;
    let existing = find_user(&txn, id).await?;

    let mut released =
        delete_results_where(&txn, uploaded_result::Column::UserId.eq(id)).await?;
    vote::Entity::delete_many()
        .filter(vote::Column::UserId.eq(id))
        .exec(&txn)
        .await?;
    challenge_user::Entity::delete_many()
        .filter(challenge_user::Column::UserId.eq(id))
        .exec(&txn)
        .await?;
    category_rating::Entity::delete_many()
        .filter(category_rating::Column::UserId.eq(id))
        .exec(&txn)
        .await?;
    sub_category_rating::Entity::delete_many()
        .filter(sub_category_rating::Column::UserId.eq(id))
        .exec(&txn)
        .await?;
    challenge::Entity::update_many()
        .col_expr(challenge::Column::CreatorId, Expr::value(Option::<i32>::None))
        .filter(challenge::Column::CreatorId.eq(id))
        .exec(&txn)
        .await?;
    archived_challenge_user::Entity::update_many()
        .col_expr(
            archived_challenge_user::Column::UserId,
            Expr::value(Option::<i32>::None),
        )
        .filter(archived_challenge_user::Column::UserId.eq(id))
        .exec(&txn)
        .await?;
    user::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;

    released.extend(existing.avatar_hash);
    release_blobs(&state, released).await;

    tracing::info!(user_id = id, by = auth_user.user_id, "User deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/history",
    tag = "Users",
    operation_id = "getUserHistory",
    summary = "Archived participations",
    description = "Paginated list of resolved challenges the user took part in, newest first.",
    params(("id" = i32, Path, description = "User ID"), HistoryQuery),
    responses(
        (status = 200, description = "Participation history", body = HistoryResponse),
        (status = 404, description = "User not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query), fields(id))]
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    find_user(&state.db, id).await?;
    let (page, per_page) = page_params(query.page, query.per_page);

    let select = archived_challenge_user::Entity::find()
        .filter(archived_challenge_user::Column::UserId.eq(id))
        .find_also_related(archived_challenge::Entity);

    let total = archived_challenge_user::Entity::find()
        .filter(archived_challenge_user::Column::UserId.eq(id))
        .count(&state.db)
        .await?;
    let pagination = Pagination::new(page, per_page, total);

    let rows = select
        .order_by_desc(archived_challenge::Column::ArchivedAt)
        .order_by_desc(archived_challenge_user::Column::Id)
        .offset(Some(pagination.offset()))
        .limit(Some(per_page))
        .all(&state.db)
        .await?;

    let data = rows
        .into_iter()
        .filter_map(|(entry, archived)| {
            archived.map(|a| HistoryItem {
                archived_challenge_id: a.id,
                title: a.title,
                category_name: a.category_name,
                sub_category_name: a.sub_category_name,
                participant_count: a.participant_count,
                placement: entry.placement,
                votes: entry.votes,
                category_rating_delta: entry.category_rating_delta,
                sub_category_rating_delta: entry.sub_category_rating_delta,
                archived_at: a.archived_at,
            })
        })
        .collect();

    Ok(Json(HistoryResponse { data, pagination }))
}

#[utoipa::path(
    put,
    path = "/me/avatar",
    tag = "Users",
    operation_id = "uploadAvatar",
    summary = "Upload own avatar",
    description = "Replaces the caller's profile image. The multipart `file` field must be an `image/*` file of at most 5 MiB.",
    request_body(content_type = "multipart/form-data", description = "Image upload"),
    responses(
        (status = 204, description = "Avatar stored"),
        (status = 400, description = "Missing file, not an image, or too large (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id))]
pub async fn upload_avatar(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let existing = find_user(&state.db, auth_user.user_id).await?;
    let max_size = Ord::min(AVATAR_MAX_BYTES, state.config.storage.max_blob_size);

    let mut stored = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        if field.name() == Some("file") {
            stored = Some(
                stream_field_to_store(field, &*state.blob_store, &state.blob_gate, max_size)
                    .await?,
            );
            break;
        }
    }
    let stored = stored.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;

    let content_type = stored
        .content_type
        .clone()
        .filter(|ct| ct != "application/octet-stream")
        .or_else(|| {
            stored
                .filename
                .as_deref()
                .and_then(|f| mime_guess::from_path(f).first())
                .map(|m| m.to_string())
        });
    let content_type = match content_type {
        Some(ct) if ct.starts_with("image/") => ct,
        _ => {
            drop(stored.pin);
            release_blobs(&state, [stored.hash.to_hex()]).await;
            return Err(AppError::Validation("Avatar must be an image".into()));
        }
    };

    let previous = existing.avatar_hash.clone();
    let mut active: user::ActiveModel = existing.into();
    active.avatar_hash = Set(Some(stored.hash.to_hex()));
    active.avatar_content_type = Set(Some(content_type));
    active.update(&state.db).await?;
    drop(stored.pin);

    if let Some(prev) = previous
        && prev != stored.hash.to_hex()
    {
        release_blobs(&state, [prev]).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/avatar",
    tag = "Users",
    operation_id = "getAvatar",
    summary = "Download a user's avatar",
    description = "Streams the avatar image. Supports ETag-based caching via If-None-Match.",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Avatar image"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 404, description = "User or avatar not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers), fields(id))]
pub async fn get_avatar(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let model = find_user(&state.db, id).await?;
    let hash = model
        .avatar_hash
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Avatar not found".into()))?;

    build_blob_response(
        BlobMeta {
            content_hash: hash,
            content_type: model.avatar_content_type.as_deref(),
            size: None,
            filename: None,
            cache_control: "public, max-age=300",
        },
        &headers,
        &*state.blob_store,
    )
    .await
}

async fn find_user<C: ConnectionTrait>(db: &C, id: i32) -> Result<user::Model, AppError> {
    user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}
