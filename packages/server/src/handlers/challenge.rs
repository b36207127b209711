use std::collections::HashSet;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use common::ChallengePhase;
use common::phase::validate_schedule;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{Func, LikeExpr, Query as SeaQuery};
use sea_orm::*;
use tracing::instrument;

use crate::entity::{category, challenge, challenge_user, uploaded_result, user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::{AuthUser, MaybeAuthUser};
use crate::extractors::json::{AppJson, AppQuery};
use crate::handlers::category::find_sub_category;
use crate::models::challenge::*;
use crate::models::shared::{Pagination, escape_like, page_params, sort_order};
use crate::services::challenge::{delete_challenge_rows, delete_results_where};
use crate::state::AppState;
use crate::utils::challenge::{
    current_phase, find_challenge, find_challenge_for_update, is_participant, require_manage,
    require_phase,
};
use crate::utils::upload::release_blobs;

#[utoipa::path(
    post,
    path = "/",
    tag = "Challenges",
    operation_id = "createChallenge",
    summary = "Create a challenge",
    description = "Creates a challenge in a category (and optionally one of its subcategories). `end_date` must be in the future and before `vote_period_end`; each window is at most 365 days. The creator joins automatically. Requires `challenge:create` permission.",
    request_body = CreateChallengeRequest,
    responses(
        (status = 201, description = "Challenge created", body = ChallengeResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Category not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(title = %payload.title))]
pub async fn create_challenge(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateChallengeRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("challenge:create")?;
    validate_create_challenge(&payload)?;

    let now = Utc::now();
    validate_schedule(payload.end_date, payload.vote_period_end, now)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    category::Entity::find_by_id(payload.category_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Category not found".into()))?;
    if let Some(sub_id) = payload.sub_category_id {
        find_sub_category(&state.db, payload.category_id, sub_id)
            .await
            .map_err(|_| {
                AppError::Validation("Subcategory does not belong to this category".into())
            })?;
    }

    let txn = state.db.begin().await?;
    let model = challenge::ActiveModel {
        title: Set(payload.title.trim().to_string()),
        description: Set(payload.description),
        category_id: Set(payload.category_id),
        sub_category_id: Set(payload.sub_category_id),
        creator_id: Set(Some(auth_user.user_id)),
        end_date: Set(payload.end_date),
        vote_period_end: Set(payload.vote_period_end),
        reminder_sent: Set(false),
        voting_notice_sent: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    challenge_user::ActiveModel {
        challenge_id: Set(model.id),
        user_id: Set(auth_user.user_id),
        joined_at: Set(now),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    tracing::info!(challenge_id = model.id, "Challenge created");
    let response = challenge_response(&state.db, model, Some(auth_user.user_id), now).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Challenges",
    operation_id = "listChallenges",
    summary = "List challenges",
    description = "Paginated list of live challenges. Filters: `category_id`, `sub_category_id`, `phase`, `search` (title), `joined=true` (authenticated only). Sort by `created_at` (default), `end_date`, `vote_period_end` or `title`.",
    params(ChallengeListQuery),
    responses(
        (status = 200, description = "List of challenges", body = ChallengeListResponse),
        (status = 400, description = "Invalid filter or sort field (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "`joined` without a token (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, viewer, query))]
pub async fn list_challenges(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ChallengeListQuery>,
) -> Result<Json<ChallengeListResponse>, AppError> {
    let (page, per_page) = page_params(query.page, query.per_page);
    let now = Utc::now();

    let mut select = challenge::Entity::find();

    if let Some(category_id) = query.category_id {
        select = select.filter(challenge::Column::CategoryId.eq(category_id));
    }
    if let Some(sub_id) = query.sub_category_id {
        select = select.filter(challenge::Column::SubCategoryId.eq(sub_id));
    }
    if let Some(phase) = query.phase {
        select = match phase {
            ChallengePhase::Joining => select.filter(challenge::Column::EndDate.gt(now)),
            ChallengePhase::Voting => select
                .filter(challenge::Column::EndDate.lte(now))
                .filter(challenge::Column::VotePeriodEnd.gt(now)),
            ChallengePhase::Finished => select.filter(challenge::Column::VotePeriodEnd.lte(now)),
        };
    }
    if let Some(ref search) = query.search {
        let term = escape_like(search.trim());
        if !term.is_empty() {
            select = select.filter(
                Expr::expr(Func::lower(Expr::col(challenge::Column::Title)))
                    .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
            );
        }
    }
    if query.joined == Some(true) {
        let viewer = viewer.as_ref().ok_or(AppError::TokenMissing)?;
        select = select.filter(
            challenge::Column::Id.in_subquery(
                SeaQuery::select()
                    .column(challenge_user::Column::ChallengeId)
                    .from(challenge_user::Entity)
                    .and_where(challenge_user::Column::UserId.eq(viewer.user_id))
                    .to_owned(),
            ),
        );
    }

    let sort_column = match query.sort_by.as_deref().unwrap_or("created_at") {
        "created_at" => challenge::Column::CreatedAt,
        "end_date" => challenge::Column::EndDate,
        "vote_period_end" => challenge::Column::VotePeriodEnd,
        "title" => challenge::Column::Title,
        _ => {
            return Err(AppError::Validation(
                "sort_by must be one of: created_at, end_date, vote_period_end, title".into(),
            ));
        }
    };

    let total = select.clone().count(&state.db).await?;
    let pagination = Pagination::new(page, per_page, total);

    let data = select
        .order_by(sort_column, sort_order(query.sort_order.as_deref()))
        .order_by_asc(challenge::Column::Id)
        .offset(Some(pagination.offset()))
        .limit(Some(per_page))
        .all(&state.db)
        .await?
        .into_iter()
        .map(|m| ChallengeListItem::new(m, now))
        .collect();

    Ok(Json(ChallengeListResponse { data, pagination }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Challenges",
    operation_id = "getChallenge",
    summary = "Get a challenge",
    description = "Returns the challenge with its current phase and counts. `joined` is included when a valid token is sent.",
    params(("id" = i32, Path, description = "Challenge ID")),
    responses(
        (status = 200, description = "Challenge details", body = ChallengeResponse),
        (status = 404, description = "Challenge not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, viewer), fields(id))]
pub async fn get_challenge(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ChallengeResponse>, AppError> {
    let model = find_challenge(&state.db, id).await?;
    let response =
        challenge_response(&state.db, model, viewer.map(|v| v.user_id), Utc::now()).await?;
    Ok(Json(response))
}

#[utoipa::path(
    patch,
    path = "/{id}",
    tag = "Challenges",
    operation_id = "updateChallenge",
    summary = "Update a challenge",
    description = "Partial update, only while the challenge is still in the joining phase. The schedule is re-validated against the effective dates. Allowed for the creator or with `challenge:manage` permission.",
    params(("id" = i32, Path, description = "Challenge ID")),
    request_body = UpdateChallengeRequest,
    responses(
        (status = 200, description = "Challenge updated", body = ChallengeResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Challenge not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Joining phase is over (PHASE_CLOSED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(id))]
pub async fn update_challenge(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<UpdateChallengeRequest>,
) -> Result<Json<ChallengeResponse>, AppError> {
    validate_update_challenge(&payload)?;
    let now = Utc::now();

    let txn = state.db.begin().await?;
    let existing = find_challenge_for_update(&txn, id).await?;
    require_manage(&auth_user, &existing, "challenge:manage")?;
    require_phase(&existing, ChallengePhase::Joining, now)?;

    if payload == UpdateChallengeRequest::default() {
        txn.commit().await?;
        let response = challenge_response(&state.db, existing, Some(auth_user.user_id), now).await?;
        return Ok(Json(response));
    }

    let effective_end = payload.end_date.unwrap_or(existing.end_date);
    let effective_vote_end = payload.vote_period_end.unwrap_or(existing.vote_period_end);
    if payload.end_date.is_some() || payload.vote_period_end.is_some() {
        validate_schedule(effective_end, effective_vote_end, now)
            .map_err(|e| AppError::Validation(e.to_string()))?;
    }
    if let Some(Some(sub_id)) = payload.sub_category_id {
        find_sub_category(&txn, existing.category_id, sub_id)
            .await
            .map_err(|_| {
                AppError::Validation("Subcategory does not belong to this category".into())
            })?;
    }

    let moved_deadline = effective_end != existing.end_date;
    let mut active: challenge::ActiveModel = existing.into();
    if let Some(ref title) = payload.title {
        active.title = Set(title.trim().to_string());
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(sub_category_id) = payload.sub_category_id {
        active.sub_category_id = Set(sub_category_id);
    }
    if let Some(end_date) = payload.end_date {
        active.end_date = Set(end_date);
    }
    if let Some(vote_period_end) = payload.vote_period_end {
        active.vote_period_end = Set(vote_period_end);
    }
    if moved_deadline {
        // The upload reminder is relative to end_date.
        active.reminder_sent = Set(false);
    }
    active.updated_at = Set(now);

    let model = active.update(&txn).await?;
    txn.commit().await?;

    let response = challenge_response(&state.db, model, Some(auth_user.user_id), now).await?;
    Ok(Json(response))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Challenges",
    operation_id = "deleteChallenge",
    summary = "Delete a challenge",
    description = "Deletes the challenge with its participants, results and votes. Allowed for the creator or with `challenge:delete` permission.",
    params(("id" = i32, Path, description = "Challenge ID")),
    responses(
        (status = 204, description = "Challenge deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Challenge not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(id))]
pub async fn delete_challenge(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state.db.begin().await?;
    let existing = find_challenge_for_update(&txn, id).await?;
    require_manage(&auth_user, &existing, "challenge:delete")?;

    let released = delete_challenge_rows(&txn, id).await?;
    txn.commit().await?;
    release_blobs(&state, released).await;

    tracing::info!(challenge_id = id, by = auth_user.user_id, "Challenge deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/join",
    tag = "Challenge Participants",
    operation_id = "joinChallenge",
    summary = "Join a challenge",
    description = "Adds the caller as a participant. Only possible during the joining phase.",
    params(("id" = i32, Path, description = "Challenge ID")),
    responses(
        (status = 201, description = "Joined", body = ParticipantResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Challenge not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Already joined (CONFLICT) or joining closed (PHASE_CLOSED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(challenge_id))]
pub async fn join_challenge(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(challenge_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let txn = state.db.begin().await?;
    let model = find_challenge_for_update(&txn, challenge_id).await?;
    require_phase(&model, ChallengePhase::Joining, now)?;

    let new_cu = challenge_user::ActiveModel {
        challenge_id: Set(challenge_id),
        user_id: Set(auth_user.user_id),
        joined_at: Set(now),
    };

    match new_cu.insert(&txn).await {
        Ok(cu) => {
            txn.commit().await?;
            Ok((
                StatusCode::CREATED,
                Json(ParticipantResponse {
                    user_id: cu.user_id,
                    username: auth_user.username,
                    joined_at: cu.joined_at,
                    has_result: false,
                }),
            ))
        }
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(AppError::Conflict("Already joined this challenge".into()))
        }
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    delete,
    path = "/{id}/join",
    tag = "Challenge Participants",
    operation_id = "leaveChallenge",
    summary = "Leave a challenge",
    description = "Removes the caller from the challenge together with their uploaded result. Only possible during the joining phase.",
    params(("id" = i32, Path, description = "Challenge ID")),
    responses(
        (status = 204, description = "Left the challenge"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Challenge not found or not joined (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Joining closed (PHASE_CLOSED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(challenge_id))]
pub async fn leave_challenge(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(challenge_id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state.db.begin().await?;
    let model = find_challenge_for_update(&txn, challenge_id).await?;
    require_phase(&model, ChallengePhase::Joining, Utc::now())?;

    let cu = challenge_user::Entity::find_by_id((challenge_id, auth_user.user_id))
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Not a participant of this challenge".into()))?;

    let released = delete_results_where(
        &txn,
        Condition::all()
            .add(uploaded_result::Column::ChallengeId.eq(challenge_id))
            .add(uploaded_result::Column::UserId.eq(auth_user.user_id)),
    )
    .await?;
    let active: challenge_user::ActiveModel = cu.into();
    active.delete(&txn).await?;
    txn.commit().await?;
    release_blobs(&state, released).await;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/{id}/participants",
    tag = "Challenge Participants",
    operation_id = "listParticipants",
    summary = "List participants",
    description = "Returns every participant ordered by join time, with whether they uploaded a result.",
    params(("id" = i32, Path, description = "Challenge ID")),
    responses(
        (status = 200, description = "Participants", body = Vec<ParticipantResponse>),
        (status = 404, description = "Challenge not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(challenge_id))]
pub async fn list_participants(
    State(state): State<AppState>,
    Path(challenge_id): Path<i32>,
) -> Result<Json<Vec<ParticipantResponse>>, AppError> {
    find_challenge(&state.db, challenge_id).await?;

    let with_result: HashSet<i32> = uploaded_result::Entity::find()
        .select_only()
        .column(uploaded_result::Column::UserId)
        .filter(uploaded_result::Column::ChallengeId.eq(challenge_id))
        .into_tuple::<i32>()
        .all(&state.db)
        .await?
        .into_iter()
        .collect();

    let rows = challenge_user::Entity::find()
        .filter(challenge_user::Column::ChallengeId.eq(challenge_id))
        .find_also_related(user::Entity)
        .order_by_asc(challenge_user::Column::JoinedAt)
        .order_by_asc(challenge_user::Column::UserId)
        .all(&state.db)
        .await?;

    let items = rows
        .into_iter()
        .map(|(cu, usr)| ParticipantResponse {
            user_id: cu.user_id,
            username: usr.map(|u| u.username).unwrap_or_default(),
            joined_at: cu.joined_at,
            has_result: with_result.contains(&cu.user_id),
        })
        .collect();

    Ok(Json(items))
}

async fn challenge_response<C: ConnectionTrait>(
    db: &C,
    model: challenge::Model,
    viewer: Option<i32>,
    now: DateTime<Utc>,
) -> Result<ChallengeResponse, AppError> {
    let participant_count = challenge_user::Entity::find()
        .filter(challenge_user::Column::ChallengeId.eq(model.id))
        .count(db)
        .await?;
    let result_count = uploaded_result::Entity::find()
        .filter(uploaded_result::Column::ChallengeId.eq(model.id))
        .count(db)
        .await?;
    let creator_username = match model.creator_id {
        Some(creator_id) => user::Entity::find_by_id(creator_id)
            .one(db)
            .await?
            .map(|u| u.username),
        None => None,
    };
    let joined = match viewer {
        Some(user_id) => Some(is_participant(db, model.id, user_id).await?),
        None => None,
    };

    Ok(ChallengeResponse {
        phase: current_phase(&model, now),
        id: model.id,
        title: model.title,
        description: model.description,
        category_id: model.category_id,
        sub_category_id: model.sub_category_id,
        creator_id: model.creator_id,
        creator_username,
        end_date: model.end_date,
        vote_period_end: model.vote_period_end,
        participant_count,
        result_count,
        joined,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}
