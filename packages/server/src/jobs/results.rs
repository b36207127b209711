use chrono::{DateTime, Utc};
use sea_orm::sea_query::Query;
use sea_orm::*;
use tracing::{error, info};

use crate::entity::{challenge, uploaded_result};
use crate::mail::{Composer, send_all};
use crate::services::resolution::resolve_challenge;
use crate::state::AppState;
use crate::utils::upload::release_blobs;

/// Resolve every challenge whose voting window closed at or before `now`.
///
/// Challenges without any uploaded result are left to the cleanup job, which
/// cancels them. Each challenge gets its own transaction, so one failure does
/// not block the rest. Returns how many challenges were archived.
pub async fn run_once(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<usize> {
    let due: Vec<i32> = challenge::Entity::find()
        .select_only()
        .column(challenge::Column::Id)
        .filter(challenge::Column::VotePeriodEnd.lte(now))
        .filter(
            challenge::Column::Id.in_subquery(
                Query::select()
                    .column(uploaded_result::Column::ChallengeId)
                    .from(uploaded_result::Entity)
                    .to_owned(),
            ),
        )
        .order_by_asc(challenge::Column::VotePeriodEnd)
        .into_tuple()
        .all(&state.db)
        .await?;

    if due.is_empty() {
        return Ok(0);
    }
    info!(count = due.len(), "Resolving challenges past their voting window");

    let mut resolved = 0;
    for challenge_id in due {
        match resolve_one(state, challenge_id, now).await {
            Ok(true) => resolved += 1,
            Ok(false) => {}
            Err(e) => error!(challenge_id, error = %e, "Failed to resolve challenge"),
        }
    }

    Ok(resolved)
}

async fn resolve_one(
    state: &AppState,
    challenge_id: i32,
    now: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let txn = state.db.begin().await?;
    let Some(resolution) = resolve_challenge(&txn, challenge_id, &state.config.rating, now).await?
    else {
        txn.rollback().await?;
        return Ok(false);
    };
    txn.commit().await?;

    info!(
        challenge_id,
        archived_id = resolution.archived_id,
        rated = resolution.rated,
        participants = resolution.notices.len(),
        "Challenge resolved"
    );

    release_blobs(state, resolution.released_hashes).await;

    let composer = Composer::new(&state.config.email);
    let emails = resolution
        .notices
        .iter()
        .map(|n| {
            composer.results(
                &n.email,
                &n.username,
                resolution.archived_id,
                &resolution.title,
                &n.summary,
            )
        })
        .collect();
    send_all(&*state.mailer, emails).await;

    Ok(true)
}
