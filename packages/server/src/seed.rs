use chrono::Utc;
use sea_orm::sea_query::{
    Index, IndexCreateStatement, MysqlQueryBuilder, OnConflict, PostgresQueryBuilder,
    SqliteQueryBuilder,
};
use sea_orm::*;
use tracing::info;

use crate::config::AuthConfig;
use crate::entity::{category_rating, challenge, role, role_permission, uploaded_result, user, vote};
use crate::utils::hash;

/// Default roles seeded on startup.
const DEFAULT_ROLES: &[&str] = &["admin", "moderator", role::DEFAULT_ROLE];

/// Every permission the server checks.
pub const ALL_PERMISSIONS: &[&str] = &[
    "category:manage",
    "challenge:create",
    "challenge:manage",
    "challenge:delete",
    "result:upload",
    "vote:cast",
    "user:manage",
];

/// Role-permission mappings for the non-admin roles. Admin gets everything.
const DEFAULT_MAPPINGS: &[(&str, &str)] = &[
    ("moderator", "category:manage"),
    ("moderator", "challenge:create"),
    ("moderator", "challenge:manage"),
    ("moderator", "challenge:delete"),
    ("moderator", "result:upload"),
    ("moderator", "vote:cast"),
    (role::DEFAULT_ROLE, "challenge:create"),
    (role::DEFAULT_ROLE, "result:upload"),
    (role::DEFAULT_ROLE, "vote:cast"),
];

/// Seed the `role` and `role_permission` tables with defaults.
pub async fn seed_role_permissions(db: &DatabaseConnection) -> Result<(), DbErr> {
    let mut roles_inserted = 0u64;
    for &name in DEFAULT_ROLES {
        let model = role::ActiveModel {
            name: Set(name.to_string()),
        };

        let result = role::Entity::insert(model)
            .on_conflict(OnConflict::column(role::Column::Name).do_nothing().to_owned())
            .exec_without_returning(db)
            .await;

        match result {
            Ok(n) => roles_inserted += n,
            Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e),
        }
    }

    if roles_inserted > 0 {
        info!("Seeded {} new roles", roles_inserted);
    }

    let admin = ALL_PERMISSIONS.iter().map(|&p| ("admin", p));
    let mut perms_inserted = 0u64;
    for (role, permission) in admin.chain(DEFAULT_MAPPINGS.iter().copied()) {
        let model = role_permission::ActiveModel {
            role: Set(role.to_string()),
            permission: Set(permission.to_string()),
        };

        let result = role_permission::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    role_permission::Column::Role,
                    role_permission::Column::Permission,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(db)
            .await;

        match result {
            Ok(n) => perms_inserted += n,
            Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e),
        }
    }

    if perms_inserted > 0 {
        info!("Seeded {} new role-permission mappings", perms_inserted);
    }

    Ok(())
}

/// Create the configured bootstrap admin if it does not exist yet.
///
/// Does nothing unless username, password and email are all set. An existing
/// account with that username is left untouched.
pub async fn ensure_admin(db: &DatabaseConnection, auth: &AuthConfig) -> anyhow::Result<()> {
    let (Some(username), Some(password), Some(email)) = (
        auth.admin_username.as_deref(),
        auth.admin_password.as_deref(),
        auth.admin_email.as_deref(),
    ) else {
        return Ok(());
    };

    let existing = user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let password = password.to_string();
    let password_hash = tokio::task::spawn_blocking(move || hash::hash_password(&password))
        .await?
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {e}"))?;

    let model = user::ActiveModel {
        username: Set(username.to_string()),
        email: Set(email.to_lowercase()),
        password: Set(password_hash),
        role: Set("admin".to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let result = user::Entity::insert(model)
        .on_conflict(OnConflict::column(user::Column::Username).do_nothing().to_owned())
        .exec_without_returning(db)
        .await;

    match result {
        Ok(n) if n > 0 => info!(username, "Created bootstrap admin"),
        Ok(_) | Err(DbErr::RecordNotInserted) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn build_index(db: &DatabaseConnection, stmt: &IndexCreateStatement) -> String {
    match db.get_database_backend() {
        DbBackend::Postgres => stmt.to_string(PostgresQueryBuilder),
        DbBackend::MySql => stmt.to_string(MysqlQueryBuilder),
        _ => stmt.to_string(SqliteQueryBuilder),
    }
}

/// Ensure required database indexes exist.
///
/// The two unique indexes back vote dedup and the one-result-per-participant
/// rule, so failing to create them aborts startup. The rest only speed up
/// queries and are logged on failure.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let unique = [
        Index::create()
            .if_not_exists()
            .unique()
            .name("uq_vote_challenge_client")
            .table(vote::Entity)
            .col(vote::Column::ChallengeId)
            .col(vote::Column::ClientKey)
            .to_owned(),
        Index::create()
            .if_not_exists()
            .unique()
            .name("uq_result_challenge_user")
            .table(uploaded_result::Entity)
            .col(uploaded_result::Column::ChallengeId)
            .col(uploaded_result::Column::UserId)
            .to_owned(),
    ];
    for stmt in &unique {
        db.execute_unprepared(&build_index(db, stmt)).await?;
    }
    info!("Ensured unique indexes on vote and uploaded_result");

    // Leaderboard ordering: rating desc within one category.
    let composite = [
        (
            "idx_category_rating_leaderboard",
            Index::create()
                .if_not_exists()
                .name("idx_category_rating_leaderboard")
                .table(category_rating::Entity)
                .col(category_rating::Column::CategoryId)
                .col(category_rating::Column::Rating)
                .to_owned(),
        ),
        // Job scans: challenges past a deadline that still need a notice.
        (
            "idx_challenge_end_reminder",
            Index::create()
                .if_not_exists()
                .name("idx_challenge_end_reminder")
                .table(challenge::Entity)
                .col(challenge::Column::EndDate)
                .col(challenge::Column::ReminderSent)
                .to_owned(),
        ),
    ];
    for (name, stmt) in &composite {
        match db.execute_unprepared(&build_index(db, stmt)).await {
            Ok(_) => info!("Ensured index {} exists", name),
            Err(e) => tracing::warn!("Failed to create index {}: {}", name, e),
        }
    }

    Ok(())
}
