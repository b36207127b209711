use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use chrono::Utc;
use common::ChallengePhase;
use sea_orm::*;
use tracing::instrument;

use crate::entity::{uploaded_result, vote};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::{AuthUser, MaybeAuthUser};
use crate::extractors::json::AppJson;
use crate::models::vote::*;
use crate::state::AppState;
use crate::utils::challenge::{find_challenge, require_phase};

/// Who is voting: the dedup key plus the account id when there is one.
struct Voter {
    client_key: String,
    user_id: Option<i32>,
}

fn identify_voter(
    viewer: Option<AuthUser>,
    headers: &HeaderMap,
    state: &AppState,
) -> Result<Voter, AppError> {
    if let Some(user) = viewer {
        user.require_permission("vote:cast")?;
        return Ok(Voter {
            client_key: user_client_key(user.user_id),
            user_id: Some(user.user_id),
        });
    }
    if !state.config.voting.allow_anonymous {
        return Err(AppError::TokenMissing);
    }

    let client_id = headers
        .get(CLIENT_ID_HEADER)
        .ok_or_else(|| {
            AppError::Validation(format!("{CLIENT_ID_HEADER} header is required to vote anonymously"))
        })?
        .to_str()
        .map_err(|_| {
            AppError::Validation(format!("{CLIENT_ID_HEADER} must be printable ASCII"))
        })?;
    validate_client_id(client_id)?;

    Ok(Voter {
        client_key: anonymous_client_key(client_id),
        user_id: None,
    })
}

async fn find_vote<C: ConnectionTrait>(
    db: &C,
    challenge_id: i32,
    client_key: &str,
) -> Result<Option<vote::Model>, DbErr> {
    vote::Entity::find()
        .filter(vote::Column::ChallengeId.eq(challenge_id))
        .filter(vote::Column::ClientKey.eq(client_key))
        .one(db)
        .await
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Votes",
    operation_id = "castVote",
    summary = "Vote for a result",
    description = "Records one vote per client during the voting phase. Authenticated callers need `vote:cast` and cannot vote for their own result. Without a token the `X-Client-Id` header identifies the voter, if anonymous voting is enabled.",
    params(
        ("id" = i32, Path, description = "Challenge ID"),
        ("X-Client-Id" = Option<String>, Header, description = "Anonymous voter identity (1-128 printable ASCII)"),
    ),
    request_body = CastVoteRequest,
    responses(
        (status = 201, description = "Vote recorded", body = VoteResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Anonymous voting disabled (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Challenge or result not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Already voted or not in voting phase (ALREADY_VOTED, PHASE_CLOSED)", body = ErrorBody),
    ),
    security((), ("jwt" = [])),
)]
#[instrument(skip(state, viewer, headers, payload), fields(challenge_id, uploaded_result_id = payload.uploaded_result_id))]
pub async fn cast_vote(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(challenge_id): Path<i32>,
    headers: HeaderMap,
    AppJson(payload): AppJson<CastVoteRequest>,
) -> Result<impl IntoResponse, AppError> {
    let voter = identify_voter(viewer, &headers, &state)?;
    let now = Utc::now();

    let model = find_challenge(&state.db, challenge_id).await?;
    require_phase(&model, ChallengePhase::Voting, now)?;

    let result = uploaded_result::Entity::find_by_id(payload.uploaded_result_id)
        .filter(uploaded_result::Column::ChallengeId.eq(challenge_id))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Result not found".into()))?;
    if voter.user_id == Some(result.user_id) {
        return Err(AppError::Validation(
            "You cannot vote for your own result".into(),
        ));
    }

    let saved = vote::ActiveModel {
        challenge_id: Set(challenge_id),
        uploaded_result_id: Set(result.id),
        user_id: Set(voter.user_id),
        client_key: Set(voter.client_key),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::AlreadyVoted,
        _ => AppError::from(e),
    })?;

    tracing::info!(vote_id = saved.id, anonymous = saved.user_id.is_none(), "Vote recorded");
    Ok((StatusCode::CREATED, Json(VoteResponse::from(saved))))
}

#[utoipa::path(
    delete,
    path = "/",
    tag = "Votes",
    operation_id = "retractVote",
    summary = "Retract a vote",
    description = "Removes the caller's vote while voting is still open.",
    params(
        ("id" = i32, Path, description = "Challenge ID"),
        ("X-Client-Id" = Option<String>, Header, description = "Anonymous voter identity"),
    ),
    responses(
        (status = 204, description = "Vote retracted"),
        (status = 401, description = "Anonymous voting disabled (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "No vote from this client (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Not in voting phase (PHASE_CLOSED)", body = ErrorBody),
    ),
    security((), ("jwt" = [])),
)]
#[instrument(skip(state, viewer, headers), fields(challenge_id))]
pub async fn retract_vote(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(challenge_id): Path<i32>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let voter = identify_voter(viewer, &headers, &state)?;

    let model = find_challenge(&state.db, challenge_id).await?;
    require_phase(&model, ChallengePhase::Voting, Utc::now())?;

    let res = vote::Entity::delete_many()
        .filter(vote::Column::ChallengeId.eq(challenge_id))
        .filter(vote::Column::ClientKey.eq(&voter.client_key))
        .exec(&state.db)
        .await?;
    if res.rows_affected == 0 {
        return Err(AppError::NotFound("No vote to retract".into()));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Votes",
    operation_id = "getMyVote",
    summary = "Get the caller's vote",
    params(
        ("id" = i32, Path, description = "Challenge ID"),
        ("X-Client-Id" = Option<String>, Header, description = "Anonymous voter identity"),
    ),
    responses(
        (status = 200, description = "Current vote", body = MyVoteResponse),
        (status = 401, description = "Anonymous voting disabled (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "Challenge not found (NOT_FOUND)", body = ErrorBody),
    ),
    security((), ("jwt" = [])),
)]
#[instrument(skip(state, viewer, headers), fields(challenge_id))]
pub async fn get_my_vote(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(challenge_id): Path<i32>,
    headers: HeaderMap,
) -> Result<Json<MyVoteResponse>, AppError> {
    let voter = identify_voter(viewer, &headers, &state)?;
    find_challenge(&state.db, challenge_id).await?;

    let existing = find_vote(&state.db, challenge_id, &voter.client_key).await?;
    Ok(Json(MyVoteResponse {
        uploaded_result_id: existing.map(|v| v.uploaded_result_id),
    }))
}
