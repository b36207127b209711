use axum::extract::DefaultBodyLimit;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

/// Room for multipart framing on top of the file itself.
fn upload_body_limit(max_file_size: u64) -> DefaultBodyLimit {
    let limit = usize::try_from(max_file_size).unwrap_or(usize::MAX);
    DefaultBodyLimit::max(limit.saturating_add(64 * 1024))
}

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/account", account_routes())
        .nest("/users", user_routes(config))
        .nest("/categories", category_routes())
        .nest("/challenges", challenge_routes(config))
        .nest("/archive", archive_routes())
}

fn account_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::account::register))
        .routes(routes!(handlers::account::login))
        .routes(routes!(handlers::account::me))
}

fn user_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let avatar_limit = handlers::user::AVATAR_MAX_BYTES.min(config.storage.max_blob_size);
    let avatar = OpenApiRouter::new()
        .routes(routes!(handlers::user::upload_avatar))
        .layer(upload_body_limit(avatar_limit));

    OpenApiRouter::new()
        .routes(routes!(handlers::user::list_users))
        .routes(routes!(handlers::user::update_me))
        .routes(routes!(
            handlers::user::get_user,
            handlers::user::delete_user
        ))
        .routes(routes!(handlers::user::set_role))
        .routes(routes!(handlers::user::get_history))
        .routes(routes!(handlers::user::get_avatar))
        .merge(avatar)
}

fn category_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::category::list_categories,
            handlers::category::create_category
        ))
        .routes(routes!(
            handlers::category::get_category,
            handlers::category::update_category,
            handlers::category::delete_category
        ))
        .routes(routes!(handlers::category::create_sub_category))
        .routes(routes!(
            handlers::category::update_sub_category,
            handlers::category::delete_sub_category
        ))
        .routes(routes!(handlers::category::category_leaderboard))
        .routes(routes!(handlers::category::sub_category_leaderboard))
}

fn challenge_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::challenge::list_challenges,
            handlers::challenge::create_challenge
        ))
        .routes(routes!(
            handlers::challenge::get_challenge,
            handlers::challenge::update_challenge,
            handlers::challenge::delete_challenge
        ))
        .routes(routes!(
            handlers::challenge::join_challenge,
            handlers::challenge::leave_challenge
        ))
        .routes(routes!(handlers::challenge::list_participants))
        .nest("/{id}/results", result_routes(config))
        .nest("/{id}/votes", vote_routes())
}

fn result_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::result::upload_result_file))
        .layer(upload_body_limit(config.storage.max_blob_size));

    OpenApiRouter::new()
        .routes(routes!(
            handlers::result::list_results,
            handlers::result::submit_result
        ))
        .routes(routes!(
            handlers::result::get_result,
            handlers::result::delete_result
        ))
        .routes(routes!(handlers::result::download_result_file))
        .merge(upload)
}

fn vote_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::vote::cast_vote,
            handlers::vote::retract_vote
        ))
        .routes(routes!(handlers::vote::get_my_vote))
}

fn archive_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::archive::list_archived))
        .routes(routes!(handlers::archive::get_archived))
}
