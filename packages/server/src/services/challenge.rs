use sea_orm::sea_query::IntoCondition;
use sea_orm::*;

use crate::entity::{challenge, challenge_user, uploaded_result, vote};

/// Delete a live challenge with its votes, results and participants.
///
/// Returns the content hashes of deleted file results. Release them with
/// `utils::upload::release_blobs` once the surrounding transaction commits.
pub async fn delete_challenge_rows<C: ConnectionTrait>(
    db: &C,
    challenge_id: i32,
) -> Result<Vec<String>, DbErr> {
    let hashes = result_hashes(
        db,
        uploaded_result::Column::ChallengeId.eq(challenge_id),
    )
    .await?;

    vote::Entity::delete_many()
        .filter(vote::Column::ChallengeId.eq(challenge_id))
        .exec(db)
        .await?;
    uploaded_result::Entity::delete_many()
        .filter(uploaded_result::Column::ChallengeId.eq(challenge_id))
        .exec(db)
        .await?;
    challenge_user::Entity::delete_many()
        .filter(challenge_user::Column::ChallengeId.eq(challenge_id))
        .exec(db)
        .await?;
    challenge::Entity::delete_by_id(challenge_id).exec(db).await?;

    Ok(hashes)
}

/// Delete uploaded results matching `condition` together with the votes cast for them.
pub async fn delete_results_where<C: ConnectionTrait>(
    db: &C,
    condition: impl IntoCondition + Clone,
) -> Result<Vec<String>, DbErr> {
    let ids: Vec<i32> = uploaded_result::Entity::find()
        .select_only()
        .column(uploaded_result::Column::Id)
        .filter(condition.clone())
        .into_tuple()
        .all(db)
        .await?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let hashes = result_hashes(db, condition).await?;
    vote::Entity::delete_many()
        .filter(vote::Column::UploadedResultId.is_in(ids.iter().copied()))
        .exec(db)
        .await?;
    uploaded_result::Entity::delete_many()
        .filter(uploaded_result::Column::Id.is_in(ids))
        .exec(db)
        .await?;
    Ok(hashes)
}

async fn result_hashes<C: ConnectionTrait>(
    db: &C,
    condition: impl IntoCondition,
) -> Result<Vec<String>, DbErr> {
    let hashes: Vec<Option<String>> = uploaded_result::Entity::find()
        .select_only()
        .column(uploaded_result::Column::ContentHash)
        .filter(condition)
        .into_tuple()
        .all(db)
        .await?;
    Ok(hashes.into_iter().flatten().collect())
}
