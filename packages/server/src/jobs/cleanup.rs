use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{LockType, Query};
use sea_orm::*;
use tracing::{error, info};

use crate::entity::{archived_challenge, archived_challenge_user, challenge, uploaded_result, user};
use crate::mail::{Composer, send_all};
use crate::services::challenge::delete_challenge_rows;
use crate::state::AppState;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Challenges removed because uploads closed without any result.
    pub cancelled: usize,
    /// Archived challenges removed by the retention window.
    pub pruned: u64,
}

pub async fn run_once(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<CleanupReport> {
    let mut report = CleanupReport::default();

    let abandoned: Vec<i32> = challenge::Entity::find()
        .select_only()
        .column(challenge::Column::Id)
        .filter(challenge::Column::EndDate.lte(now))
        .filter(
            challenge::Column::Id.not_in_subquery(
                Query::select()
                    .column(uploaded_result::Column::ChallengeId)
                    .from(uploaded_result::Entity)
                    .to_owned(),
            ),
        )
        .into_tuple()
        .all(&state.db)
        .await?;

    for challenge_id in abandoned {
        match cancel_challenge(state, challenge_id, now).await {
            Ok(true) => report.cancelled += 1,
            Ok(false) => {}
            Err(e) => error!(challenge_id, error = %e, "Failed to cancel empty challenge"),
        }
    }

    let retention_days = state.config.jobs.archive_retention_days;
    if retention_days > 0 {
        report.pruned = prune_archive(&state.db, now - Duration::days(retention_days)).await?;
    }

    if report != CleanupReport::default() {
        info!(
            cancelled = report.cancelled,
            pruned = report.pruned,
            "Cleanup finished"
        );
    }
    Ok(report)
}

async fn cancel_challenge(
    state: &AppState,
    challenge_id: i32,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let txn = state.db.begin().await?;

    let Some(model) = challenge::Entity::find_by_id(challenge_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
    else {
        txn.rollback().await?;
        return Ok(false);
    };

    let results = uploaded_result::Entity::find()
        .filter(uploaded_result::Column::ChallengeId.eq(challenge_id))
        .count(&txn)
        .await?;
    if model.end_date > now || results > 0 {
        txn.rollback().await?;
        return Ok(false);
    }

    let creator = match model.creator_id {
        Some(id) => user::Entity::find_by_id(id).one(&txn).await?,
        None => None,
    };

    delete_challenge_rows(&txn, challenge_id).await?;
    txn.commit().await?;
    info!(challenge_id, title = %model.title, "Cancelled challenge without results");

    if let Some(creator) = creator {
        let composer = Composer::new(&state.config.email);
        let email = composer.challenge_cancelled(&creator.email, &creator.username, &model.title);
        send_all(&*state.mailer, vec![email]).await;
    }

    Ok(true)
}

async fn prune_archive(db: &DatabaseConnection, cutoff: DateTime<Utc>) -> Result<u64, DbErr> {
    let expired: Vec<i32> = archived_challenge::Entity::find()
        .select_only()
        .column(archived_challenge::Column::Id)
        .filter(archived_challenge::Column::ArchivedAt.lt(cutoff))
        .into_tuple()
        .all(db)
        .await?;
    if expired.is_empty() {
        return Ok(0);
    }

    let txn = db.begin().await?;
    archived_challenge_user::Entity::delete_many()
        .filter(archived_challenge_user::Column::ArchivedChallengeId.is_in(expired.clone()))
        .exec(&txn)
        .await?;
    let res = archived_challenge::Entity::delete_many()
        .filter(archived_challenge::Column::Id.is_in(expired))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    Ok(res.rows_affected)
}
