use chrono::{DateTime, Utc};
use common::{ChallengePhase, phase::phase_at};
use sea_orm::sea_query::LockType;
use sea_orm::*;

use crate::entity::{challenge, challenge_user};
use crate::error::AppError;
use crate::extractors::auth::AuthUser;

pub async fn find_challenge<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<challenge::Model, AppError> {
    challenge::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Challenge not found".into()))
}

pub async fn find_challenge_for_update(
    txn: &DatabaseTransaction,
    id: i32,
) -> Result<challenge::Model, AppError> {
    challenge::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Challenge not found".into()))
}

pub fn current_phase(model: &challenge::Model, now: DateTime<Utc>) -> ChallengePhase {
    phase_at(model.end_date, model.vote_period_end, now)
}

/// Reject the operation with `PHASE_CLOSED` unless the challenge is in `expected`.
pub fn require_phase(
    model: &challenge::Model,
    expected: ChallengePhase,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let actual = current_phase(model, now);
    if actual == expected {
        return Ok(());
    }
    let message = match expected {
        ChallengePhase::Joining => "The joining period of this challenge has ended",
        ChallengePhase::Voting if actual == ChallengePhase::Joining => {
            "Voting has not started yet"
        }
        ChallengePhase::Voting => "Voting has ended",
        ChallengePhase::Finished => "The challenge has not finished yet",
    };
    Err(AppError::PhaseClosed(message.into()))
}

pub async fn is_participant<C: ConnectionTrait>(
    db: &C,
    challenge_id: i32,
    user_id: i32,
) -> Result<bool, AppError> {
    Ok(challenge_user::Entity::find_by_id((challenge_id, user_id))
        .one(db)
        .await?
        .is_some())
}

pub async fn require_participant<C: ConnectionTrait>(
    db: &C,
    challenge_id: i32,
    user_id: i32,
) -> Result<(), AppError> {
    if is_participant(db, challenge_id, user_id).await? {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

/// The creator may always manage their challenge; others need `permission`.
pub fn can_manage(auth_user: &AuthUser, model: &challenge::Model, permission: &str) -> bool {
    model.creator_id == Some(auth_user.user_id) || auth_user.has_permission(permission)
}

pub fn require_manage(
    auth_user: &AuthUser,
    model: &challenge::Model,
    permission: &str,
) -> Result<(), AppError> {
    if can_manage(auth_user, model, permission) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}
