use std::collections::HashMap;

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use common::{ChallengePhase, ResultKind};
use sea_orm::*;
use tracing::instrument;

use crate::entity::{challenge, uploaded_result, user, vote};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::result::*;
use crate::services::challenge::delete_results_where;
use crate::state::AppState;
use crate::utils::challenge::{
    current_phase, find_challenge, find_challenge_for_update, require_participant, require_phase,
};
use crate::utils::filename::sanitize_upload_name;
use crate::utils::upload::{
    BlobMeta, BlobPin, build_blob_response, release_blobs, stream_field_to_store,
};

/// Content of a new or replacing result row.
struct NewResult {
    kind: ResultKind,
    url: Option<String>,
    text: Option<String>,
    content_hash: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
    size: Option<i64>,
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Results",
    operation_id = "submitResult",
    summary = "Submit a URL or text result",
    description = "Stores the caller's result for the challenge, replacing any earlier one. Only participants may submit, and only during the joining phase. Requires `result:upload` permission.",
    params(("id" = i32, Path, description = "Challenge ID")),
    request_body = SubmitResultRequest,
    responses(
        (status = 201, description = "Result stored", body = ResultResponse),
        (status = 200, description = "Earlier result replaced", body = ResultResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not a participant (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Challenge not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Uploads closed (PHASE_CLOSED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(challenge_id))]
pub async fn submit_result(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(challenge_id): Path<i32>,
    AppJson(payload): AppJson<SubmitResultRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_permission("result:upload")?;
    let content = validate_submit_result(&payload)?;

    let new = match content {
        ResultContent::Url(url) => NewResult {
            kind: ResultKind::Url,
            url: Some(url),
            text: None,
            content_hash: None,
            filename: None,
            content_type: None,
            size: None,
        },
        ResultContent::Text(text) => NewResult {
            kind: ResultKind::Text,
            url: None,
            text: Some(text),
            content_hash: None,
            filename: None,
            content_type: None,
            size: None,
        },
    };

    store_result(&state, challenge_id, &auth_user, new, None).await
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "Results",
    operation_id = "uploadResultFile",
    summary = "Upload a file result",
    description = "Stores the multipart `file` field as the caller's result, replacing any earlier one. Same rules as the JSON submission; the size limit comes from the storage configuration.",
    params(("id" = i32, Path, description = "Challenge ID")),
    request_body(content_type = "multipart/form-data", description = "Result file"),
    responses(
        (status = 201, description = "Result stored", body = ResultResponse),
        (status = 200, description = "Earlier result replaced", body = ResultResponse),
        (status = 400, description = "Missing or invalid file (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Not a participant (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Challenge not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Uploads closed (PHASE_CLOSED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(challenge_id))]
pub async fn upload_result_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(challenge_id): Path<i32>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    auth_user.require_permission("result:upload")?;

    // Check the gates before accepting any bytes.
    let model = find_challenge(&state.db, challenge_id).await?;
    require_phase(&model, ChallengePhase::Joining, Utc::now())?;
    require_participant(&state.db, challenge_id, auth_user.user_id).await?;

    let mut stored = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        if field.name() == Some("file") {
            stored = Some(
                stream_field_to_store(
                    field,
                    &*state.blob_store,
                    &state.blob_gate,
                    state.config.storage.max_blob_size,
                )
                .await?,
            );
            break;
        }
    }
    let stored = stored.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;
    let hash = stored.hash.to_hex();

    let filename = match stored.filename.as_deref().map(sanitize_upload_name) {
        Some(Ok(name)) => name,
        Some(Err(e)) => {
            drop(stored.pin);
            release_blobs(&state, [hash]).await;
            return Err(AppError::Validation(e.to_string()));
        }
        None => "upload".to_string(),
    };
    let content_type = stored
        .content_type
        .filter(|ct| ct != "application/octet-stream")
        .or_else(|| mime_guess::from_path(&filename).first().map(|m| m.to_string()));

    let new = NewResult {
        kind: ResultKind::File,
        url: None,
        text: None,
        content_hash: Some(hash.clone()),
        filename: Some(filename),
        content_type,
        size: Some(stored.size),
    };

    match store_result(&state, challenge_id, &auth_user, new, Some(stored.pin)).await {
        Ok(response) => Ok(response.into_response()),
        Err(e) => {
            release_blobs(&state, [hash]).await;
            Err(e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Results",
    operation_id = "listResults",
    summary = "List results",
    description = "Returns every uploaded result of the challenge. Vote counts stay hidden (null) until the challenge has finished.",
    params(("id" = i32, Path, description = "Challenge ID")),
    responses(
        (status = 200, description = "Results", body = Vec<ResultResponse>),
        (status = 404, description = "Challenge not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(challenge_id))]
pub async fn list_results(
    State(state): State<AppState>,
    Path(challenge_id): Path<i32>,
) -> Result<Json<Vec<ResultResponse>>, AppError> {
    let model = find_challenge(&state.db, challenge_id).await?;
    let counts = visible_vote_counts(&state.db, &model).await?;

    let rows = uploaded_result::Entity::find()
        .filter(uploaded_result::Column::ChallengeId.eq(challenge_id))
        .find_also_related(user::Entity)
        .order_by_asc(uploaded_result::Column::SubmittedAt)
        .order_by_asc(uploaded_result::Column::Id)
        .all(&state.db)
        .await?;

    let items = rows
        .into_iter()
        .map(|(r, u)| {
            let votes = counts
                .as_ref()
                .map(|c| c.get(&r.id).copied().unwrap_or(0));
            ResultResponse::new(r, u.map(|u| u.username).unwrap_or_default(), votes)
        })
        .collect();

    Ok(Json(items))
}

#[utoipa::path(
    get,
    path = "/{result_id}",
    tag = "Results",
    operation_id = "getResult",
    summary = "Get a result",
    params(
        ("id" = i32, Path, description = "Challenge ID"),
        ("result_id" = i32, Path, description = "Uploaded result ID"),
    ),
    responses(
        (status = 200, description = "Result", body = ResultResponse),
        (status = 404, description = "Challenge or result not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(challenge_id, result_id))]
pub async fn get_result(
    State(state): State<AppState>,
    Path((challenge_id, result_id)): Path<(i32, i32)>,
) -> Result<Json<ResultResponse>, AppError> {
    let model = find_challenge(&state.db, challenge_id).await?;
    let result = find_result(&state.db, challenge_id, result_id).await?;
    let username = user::Entity::find_by_id(result.user_id)
        .one(&state.db)
        .await?
        .map(|u| u.username)
        .unwrap_or_default();
    let votes = visible_vote_counts(&state.db, &model)
        .await?
        .map(|c| c.get(&result.id).copied().unwrap_or(0));

    Ok(Json(ResultResponse::new(result, username, votes)))
}

#[utoipa::path(
    get,
    path = "/{result_id}/file",
    tag = "Results",
    operation_id = "downloadResultFile",
    summary = "Download a file result",
    description = "Streams the uploaded file. Supports ETag-based caching via If-None-Match.",
    params(
        ("id" = i32, Path, description = "Challenge ID"),
        ("result_id" = i32, Path, description = "Uploaded result ID"),
    ),
    responses(
        (status = 200, description = "File content"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 404, description = "Result not found or not a file (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, headers), fields(challenge_id, result_id))]
pub async fn download_result_file(
    State(state): State<AppState>,
    Path((challenge_id, result_id)): Path<(i32, i32)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let result = find_result(&state.db, challenge_id, result_id).await?;
    let hash = result
        .content_hash
        .as_deref()
        .ok_or_else(|| AppError::NotFound("Result has no file".into()))?;

    build_blob_response(
        BlobMeta {
            content_hash: hash,
            content_type: result.content_type.as_deref(),
            size: result.size,
            filename: result.filename.as_deref(),
            cache_control: "public, max-age=3600",
        },
        &headers,
        &*state.blob_store,
    )
    .await
}

#[utoipa::path(
    delete,
    path = "/{result_id}",
    tag = "Results",
    operation_id = "deleteResult",
    summary = "Delete a result",
    description = "The owner may delete their result during the joining phase. With `challenge:manage` permission any result can be deleted at any time, together with its votes.",
    params(
        ("id" = i32, Path, description = "Challenge ID"),
        ("result_id" = i32, Path, description = "Uploaded result ID"),
    ),
    responses(
        (status = 204, description = "Result deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Challenge or result not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Uploads closed for the owner (PHASE_CLOSED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(challenge_id, result_id))]
pub async fn delete_result(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path((challenge_id, result_id)): Path<(i32, i32)>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state.db.begin().await?;
    let model = find_challenge_for_update(&txn, challenge_id).await?;
    let result = find_result(&txn, challenge_id, result_id).await?;

    if !auth_user.has_permission("challenge:manage") {
        if result.user_id != auth_user.user_id {
            return Err(AppError::PermissionDenied);
        }
        require_phase(&model, ChallengePhase::Joining, Utc::now())?;
    }

    let released = delete_results_where(&txn, uploaded_result::Column::Id.eq(result_id)).await?;
    txn.commit().await?;
    release_blobs(&state, released).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Insert or replace the caller's result, returning 201 or 200 respectively.
///
/// `pin` covers the new file blob, if any, and is dropped once the row commits.
async fn store_result(
    state: &AppState,
    challenge_id: i32,
    auth_user: &AuthUser,
    new: NewResult,
    pin: Option<BlobPin>,
) -> Result<(StatusCode, Json<ResultResponse>), AppError> {
    let now = Utc::now();
    let txn = state.db.begin().await?;
    let model = find_challenge_for_update(&txn, challenge_id).await?;
    require_phase(&model, ChallengePhase::Joining, now)?;
    require_participant(&txn, challenge_id, auth_user.user_id).await?;

    let previous = uploaded_result::Entity::find()
        .filter(uploaded_result::Column::ChallengeId.eq(challenge_id))
        .filter(uploaded_result::Column::UserId.eq(auth_user.user_id))
        .one(&txn)
        .await?;

    let (status, saved, old_hash) = match previous {
        Some(prev) => {
            let old_hash = prev.content_hash.clone();
            let mut active: uploaded_result::ActiveModel = prev.into();
            active.kind = Set(new.kind);
            active.url = Set(new.url);
            active.text = Set(new.text);
            active.content_hash = Set(new.content_hash);
            active.filename = Set(new.filename);
            active.content_type = Set(new.content_type);
            active.size = Set(new.size);
            active.submitted_at = Set(now);
            (StatusCode::OK, active.update(&txn).await?, old_hash)
        }
        None => {
            let inserted = uploaded_result::ActiveModel {
                challenge_id: Set(challenge_id),
                user_id: Set(auth_user.user_id),
                kind: Set(new.kind),
                url: Set(new.url),
                text: Set(new.text),
                content_hash: Set(new.content_hash),
                filename: Set(new.filename),
                content_type: Set(new.content_type),
                size: Set(new.size),
                submitted_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    AppError::Conflict("A result for this participant is being stored".into())
                }
                _ => AppError::from(e),
            })?;
            (StatusCode::CREATED, inserted, None)
        }
    };
    txn.commit().await?;
    drop(pin);

    if let Some(old) = old_hash
        && saved.content_hash.as_deref() != Some(old.as_str())
    {
        release_blobs(state, [old]).await;
    }

    tracing::info!(result_id = saved.id, kind = %saved.kind, "Result stored");
    Ok((
        status,
        Json(ResultResponse::new(saved, auth_user.username.clone(), None)),
    ))
}

async fn find_result<C: ConnectionTrait>(
    db: &C,
    challenge_id: i32,
    result_id: i32,
) -> Result<uploaded_result::Model, AppError> {
    uploaded_result::Entity::find_by_id(result_id)
        .filter(uploaded_result::Column::ChallengeId.eq(challenge_id))
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Result not found".into()))
}

/// Vote counts per result once the challenge has finished, `None` before.
async fn visible_vote_counts<C: ConnectionTrait>(
    db: &C,
    model: &challenge::Model,
) -> Result<Option<HashMap<i32, u64>>, AppError> {
    if current_phase(model, Utc::now()) != ChallengePhase::Finished {
        return Ok(None);
    }
    let rows: Vec<(i32, i64)> = vote::Entity::find()
        .select_only()
        .column(vote::Column::UploadedResultId)
        .column_as(vote::Column::Id.count(), "votes")
        .filter(vote::Column::ChallengeId.eq(model.id))
        .group_by(vote::Column::UploadedResultId)
        .into_tuple()
        .all(db)
        .await?;
    Ok(Some(
        rows.into_iter()
            .map(|(id, n)| (id, u64::try_from(n).unwrap_or(0)))
            .collect(),
    ))
}
