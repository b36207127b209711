use axum::Json;
use axum::extract::{Path, State};
use sea_orm::*;
use tracing::instrument;

use crate::entity::{archived_challenge, archived_challenge_user};
use crate::error::{AppError, ErrorBody};
use crate::extractors::json::AppQuery;
use crate::models::archive::*;
use crate::models::shared::{Pagination, page_params};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/",
    tag = "Archive",
    operation_id = "listArchivedChallenges",
    summary = "List archived challenges",
    description = "Paginated list of resolved challenges, newest first. Filter by `category_id` or `sub_category_id`.",
    params(ArchiveListQuery),
    responses(
        (status = 200, description = "Archived challenges", body = ArchiveListResponse),
        (status = 400, description = "Invalid query (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, query))]
pub async fn list_archived(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ArchiveListQuery>,
) -> Result<Json<ArchiveListResponse>, AppError> {
    let (page, per_page) = page_params(query.page, query.per_page);

    let mut select = archived_challenge::Entity::find();
    if let Some(category_id) = query.category_id {
        select = select.filter(archived_challenge::Column::CategoryId.eq(category_id));
    }
    if let Some(sub_id) = query.sub_category_id {
        select = select.filter(archived_challenge::Column::SubCategoryId.eq(sub_id));
    }

    let total = select.clone().count(&state.db).await?;
    let pagination = Pagination::new(page, per_page, total);

    let data = select
        .order_by_desc(archived_challenge::Column::ArchivedAt)
        .order_by_desc(archived_challenge::Column::Id)
        .offset(Some(pagination.offset()))
        .limit(Some(per_page))
        .all(&state.db)
        .await?
        .into_iter()
        .map(ArchivedChallengeSummary::from)
        .collect();

    Ok(Json(ArchiveListResponse { data, pagination }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Archive",
    operation_id = "getArchivedChallenge",
    summary = "Get an archived challenge",
    description = "Returns the snapshot with every participant's placement, votes and rating change. Ranked participants come first, by placement; the rest follow by username.",
    params(("id" = i32, Path, description = "Archived challenge ID")),
    responses(
        (status = 200, description = "Archived challenge", body = ArchivedChallengeResponse),
        (status = 404, description = "Not found (NOT_FOUND)", body = ErrorBody),
    ),
)]
#[instrument(skip(state), fields(id))]
pub async fn get_archived(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ArchivedChallengeResponse>, AppError> {
    let model = archived_challenge::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Archived challenge not found".into()))?;

    let mut rows = archived_challenge_user::Entity::find()
        .filter(archived_challenge_user::Column::ArchivedChallengeId.eq(id))
        .all(&state.db)
        .await?;
    rows.sort_by(|a, b| {
        (a.placement.is_none(), a.placement, &a.username).cmp(&(
            b.placement.is_none(),
            b.placement,
            &b.username,
        ))
    });

    let description = model.description.clone();
    Ok(Json(ArchivedChallengeResponse {
        challenge: model.into(),
        description,
        participants: rows.into_iter().map(Into::into).collect(),
    }))
}
