use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::rating::RatingChange;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{ExprTrait, OnConflict};
use sea_orm::*;

use crate::entity::{category_rating, sub_category_rating};

/// Which rating table a set of changes applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingScope {
    Category(i32),
    SubCategory(i32),
}

/// Make sure every user has a rating row in `scope`, then return `user_id -> rating`.
///
/// Missing rows start at `initial_rating`; existing rows are left alone.
pub async fn ensure_ratings_for_participants<C: ConnectionTrait>(
    db: &C,
    user_ids: &[i32],
    scope: RatingScope,
    initial_rating: i32,
    now: DateTime<Utc>,
) -> Result<HashMap<i32, i32>, DbErr> {
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut created = 0u32;
    for &user_id in user_ids {
        let result = match scope {
            RatingScope::Category(category_id) => {
                category_rating::Entity::insert(category_rating::ActiveModel {
                    user_id: Set(user_id),
                    category_id: Set(category_id),
                    rating: Set(initial_rating),
                    challenges_played: Set(0),
                    updated_at: Set(now),
                })
                .on_conflict(
                    OnConflict::columns([
                        category_rating::Column::UserId,
                        category_rating::Column::CategoryId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(db)
                .await
            }
            RatingScope::SubCategory(sub_category_id) => {
                sub_category_rating::Entity::insert(sub_category_rating::ActiveModel {
                    user_id: Set(user_id),
                    sub_category_id: Set(sub_category_id),
                    rating: Set(initial_rating),
                    challenges_played: Set(0),
                    updated_at: Set(now),
                })
                .on_conflict(
                    OnConflict::columns([
                        sub_category_rating::Column::UserId,
                        sub_category_rating::Column::SubCategoryId,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(db)
                .await
            }
        };

        match result {
            Ok(n) if n > 0 => created += 1,
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e),
        }
    }

    if created > 0 {
        tracing::debug!(?scope, created, "Created initial rating rows");
    }

    current_ratings(db, user_ids, scope).await
}

async fn current_ratings<C: ConnectionTrait>(
    db: &C,
    user_ids: &[i32],
    scope: RatingScope,
) -> Result<HashMap<i32, i32>, DbErr> {
    let rows: Vec<(i32, i32)> = match scope {
        RatingScope::Category(category_id) => {
            category_rating::Entity::find()
                .select_only()
                .column(category_rating::Column::UserId)
                .column(category_rating::Column::Rating)
                .filter(category_rating::Column::CategoryId.eq(category_id))
                .filter(category_rating::Column::UserId.is_in(user_ids.iter().copied()))
                .into_tuple()
                .all(db)
                .await?
        }
        RatingScope::SubCategory(sub_category_id) => {
            sub_category_rating::Entity::find()
                .select_only()
                .column(sub_category_rating::Column::UserId)
                .column(sub_category_rating::Column::Rating)
                .filter(sub_category_rating::Column::SubCategoryId.eq(sub_category_id))
                .filter(sub_category_rating::Column::UserId.is_in(user_ids.iter().copied()))
                .into_tuple()
                .all(db)
                .await?
        }
    };
    Ok(rows.into_iter().collect())
}

/// Store each entrant's new rating and count the challenge as played.
pub async fn apply_changes<C: ConnectionTrait>(
    db: &C,
    scope: RatingScope,
    changes: &[RatingChange],
    now: DateTime<Utc>,
) -> Result<(), DbErr> {
    for change in changes {
        match scope {
            RatingScope::Category(category_id) => {
                category_rating::Entity::update_many()
                    .col_expr(category_rating::Column::Rating, Expr::value(change.rating_after))
                    .col_expr(
                        category_rating::Column::ChallengesPlayed,
                        Expr::col(category_rating::Column::ChallengesPlayed).add(1),
                    )
                    .col_expr(category_rating::Column::UpdatedAt, Expr::value(now))
                    .filter(category_rating::Column::UserId.eq(change.user_id))
                    .filter(category_rating::Column::CategoryId.eq(category_id))
                    .exec(db)
                    .await?;
            }
            RatingScope::SubCategory(sub_category_id) => {
                sub_category_rating::Entity::update_many()
                    .col_expr(
                        sub_category_rating::Column::Rating,
                        Expr::value(change.rating_after),
                    )
                    .col_expr(
                        sub_category_rating::Column::ChallengesPlayed,
                        Expr::col(sub_category_rating::Column::ChallengesPlayed).add(1),
                    )
                    .col_expr(sub_category_rating::Column::UpdatedAt, Expr::value(now))
                    .filter(sub_category_rating::Column::UserId.eq(change.user_id))
                    .filter(sub_category_rating::Column::SubCategoryId.eq(sub_category_id))
                    .exec(db)
                    .await?;
            }
        }
    }
    Ok(())
}
