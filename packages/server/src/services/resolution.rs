//! Turning a challenge whose voting window closed into an archived snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::rating::{Entrant, RatingChange, compute_changes, placements};
use sea_orm::sea_query::LockType;
use sea_orm::*;

use super::challenge::delete_challenge_rows;
use super::rating::{RatingScope, apply_changes, ensure_ratings_for_participants};
use crate::config::RatingConfig;
use crate::entity::{
    archived_challenge, archived_challenge_user, category, challenge, challenge_user,
    sub_category, uploaded_result, user, vote,
};
use crate::mail::ResultSummary;

/// A participant to notify once the resolving transaction has committed.
#[derive(Debug, Clone)]
pub struct ResultNotice {
    pub email: String,
    pub username: String,
    pub summary: ResultSummary,
}

#[derive(Debug)]
pub struct Resolution {
    pub archived_id: i32,
    pub title: String,
    pub rated: bool,
    pub notices: Vec<ResultNotice>,
    /// Blobs of the deleted results, to release after commit.
    pub released_hashes: Vec<String>,
}

struct Participant {
    user: user::Model,
    result_id: Option<i32>,
    votes: i64,
}

/// Resolve one challenge inside `txn`: count votes, rate entrants, archive, delete.
///
/// Returns `None` when the challenge is gone, its voting window is still open,
/// or nobody uploaded a result (cleanup cancels those). Concurrent runs are
/// therefore harmless.
pub async fn resolve_challenge(
    txn: &DatabaseTransaction,
    challenge_id: i32,
    rating: &RatingConfig,
    now: DateTime<Utc>,
) -> Result<Option<Resolution>, DbErr> {
    let Some(model) = challenge::Entity::find_by_id(challenge_id)
        .lock(LockType::Update)
        .one(txn)
        .await?
    else {
        return Ok(None);
    };
    if model.vote_period_end > now {
        return Ok(None);
    }

    let participants = load_participants(txn, challenge_id).await?;

    // Entrants are participants with a result, ordered by user id.
    let entrant_idx: Vec<usize> = participants
        .iter()
        .enumerate()
        .filter(|(_, p)| p.result_id.is_some())
        .map(|(i, _)| i)
        .collect();
    if entrant_idx.is_empty() {
        return Ok(None);
    }
    let entrant_ids: Vec<i32> = entrant_idx.iter().map(|&i| participants[i].user.id).collect();
    let rated = entrant_idx.len() >= rating.min_rated_entrants.max(1);

    let scores: Vec<i64> = entrant_idx.iter().map(|&i| participants[i].votes).collect();
    let places: HashMap<i32, u32> = entrant_ids
        .iter()
        .copied()
        .zip(placements(&scores))
        .collect();

    let mut category_changes: HashMap<i32, RatingChange> = HashMap::new();
    let mut sub_changes: HashMap<i32, RatingChange> = HashMap::new();
    if rated {
        category_changes = rate_scope(
            txn,
            &participants,
            &entrant_idx,
            RatingScope::Category(model.category_id),
            rating,
            now,
        )
        .await?;
        if let Some(sub_id) = model.sub_category_id {
            sub_changes = rate_scope(
                txn,
                &participants,
                &entrant_idx,
                RatingScope::SubCategory(sub_id),
                rating,
                now,
            )
            .await?;
        }
    }

    let category_name = category::Entity::find_by_id(model.category_id)
        .one(txn)
        .await?
        .map(|c| c.name)
        .unwrap_or_default();
    let sub_category_name = match model.sub_category_id {
        Some(id) => sub_category::Entity::find_by_id(id)
            .one(txn)
            .await?
            .map(|s| s.name),
        None => None,
    };
    let creator_username = match model.creator_id {
        Some(id) => user::Entity::find_by_id(id)
            .one(txn)
            .await?
            .map(|u| u.username),
        None => None,
    };

    let archived = archived_challenge::ActiveModel {
        original_challenge_id: Set(model.id),
        title: Set(model.title.clone()),
        description: Set(model.description.clone()),
        category_id: Set(Some(model.category_id)),
        category_name: Set(category_name),
        sub_category_id: Set(model.sub_category_id),
        sub_category_name: Set(sub_category_name),
        creator_username: Set(creator_username),
        end_date: Set(model.end_date),
        vote_period_end: Set(model.vote_period_end),
        participant_count: Set(participants.len() as i32),
        rated: Set(rated),
        archived_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await?;

    let mut rows = Vec::with_capacity(participants.len());
    let mut notices = Vec::with_capacity(participants.len());
    for p in &participants {
        let uid = p.user.id;
        let placement = places.get(&uid).map(|&place| place as i32);
        let cat = category_changes.get(&uid);
        let sub = sub_changes.get(&uid);

        rows.push(archived_challenge_user::ActiveModel {
            archived_challenge_id: Set(archived.id),
            user_id: Set(Some(uid)),
            username: Set(p.user.username.clone()),
            placement: Set(placement),
            votes: Set(p.votes as i32),
            category_rating_before: Set(cat.map(|c| c.rating_before)),
            category_rating_after: Set(cat.map(|c| c.rating_after)),
            category_rating_delta: Set(cat.map(|c| c.delta)),
            sub_category_rating_before: Set(sub.map(|c| c.rating_before)),
            sub_category_rating_after: Set(sub.map(|c| c.rating_after)),
            sub_category_rating_delta: Set(sub.map(|c| c.delta)),
            ..Default::default()
        });
        notices.push(ResultNotice {
            email: p.user.email.clone(),
            username: p.user.username.clone(),
            summary: ResultSummary {
                placement,
                votes: p.votes as i32,
                entrants: entrant_ids.len(),
                rating_after: cat.map(|c| c.rating_after),
                rating_delta: cat.map(|c| c.delta),
            },
        });
    }
    if !rows.is_empty() {
        archived_challenge_user::Entity::insert_many(rows)
            .exec_without_returning(txn)
            .await?;
    }

    let released_hashes = delete_challenge_rows(txn, model.id).await?;

    Ok(Some(Resolution {
        archived_id: archived.id,
        title: model.title,
        rated,
        notices,
        released_hashes,
    }))
}

async fn load_participants(
    txn: &DatabaseTransaction,
    challenge_id: i32,
) -> Result<Vec<Participant>, DbErr> {
    let members = challenge_user::Entity::find()
        .filter(challenge_user::Column::ChallengeId.eq(challenge_id))
        .find_also_related(user::Entity)
        .order_by_asc(challenge_user::Column::UserId)
        .all(txn)
        .await?;

    let results: HashMap<i32, i32> = uploaded_result::Entity::find()
        .select_only()
        .column(uploaded_result::Column::UserId)
        .column(uploaded_result::Column::Id)
        .filter(uploaded_result::Column::ChallengeId.eq(challenge_id))
        .into_tuple::<(i32, i32)>()
        .all(txn)
        .await?
        .into_iter()
        .collect();

    let vote_counts: HashMap<i32, i64> = vote::Entity::find()
        .select_only()
        .column(vote::Column::UploadedResultId)
        .column_as(vote::Column::Id.count(), "votes")
        .filter(vote::Column::ChallengeId.eq(challenge_id))
        .group_by(vote::Column::UploadedResultId)
        .into_tuple::<(i32, i64)>()
        .all(txn)
        .await?
        .into_iter()
        .collect();

    Ok(members
        .into_iter()
        .filter_map(|(_, u)| u)
        .map(|user| {
            let result_id = results.get(&user.id).copied();
            let votes = result_id
                .and_then(|id| vote_counts.get(&id).copied())
                .unwrap_or(0);
            Participant {
                user,
                result_id,
                votes,
            }
        })
        .collect())
}

async fn rate_scope(
    txn: &DatabaseTransaction,
    participants: &[Participant],
    entrant_idx: &[usize],
    scope: RatingScope,
    config: &RatingConfig,
    now: DateTime<Utc>,
) -> Result<HashMap<i32, RatingChange>, DbErr> {
    let ids: Vec<i32> = entrant_idx.iter().map(|&i| participants[i].user.id).collect();
    let current =
        ensure_ratings_for_participants(txn, &ids, scope, config.initial_rating, now).await?;

    let entrants: Vec<Entrant> = entrant_idx
        .iter()
        .map(|&i| {
            let p = &participants[i];
            Entrant {
                user_id: p.user.id,
                rating: current
                    .get(&p.user.id)
                    .copied()
                    .unwrap_or(config.initial_rating),
                score: p.votes,
            }
        })
        .collect();

    let changes = compute_changes(&entrants, config.k_factor);
    apply_changes(txn, scope, &changes, now).await?;
    Ok(changes.into_iter().map(|c| (c.user_id, c)).collect())
}
