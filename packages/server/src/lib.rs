pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod jobs;
pub mod mail;
pub mod models;
pub mod routes;
pub mod seed;
pub mod services;
pub mod state;
pub mod utils;

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_axum::router::OpenApiRouter;
use utoipa_scalar::{Scalar, Servable as ScalarServable};
use utoipa_swagger_ui::SwaggerUi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SkillChallenge API",
        version = "1.0.0",
        description = "Time-boxed skill challenges with community voting and per-category Elo ratings"
    ),
    tags(
        (name = "Account", description = "Registration, login and the current account"),
        (name = "Users", description = "Profiles, roles, avatars and participation history"),
        (name = "Categories", description = "Category and subcategory taxonomy"),
        (name = "Leaderboards", description = "Ratings per category and subcategory"),
        (name = "Challenges", description = "Challenge CRUD and listing"),
        (name = "Challenge Participants", description = "Joining and leaving challenges"),
        (name = "Results", description = "Uploaded results of participants"),
        (name = "Votes", description = "Voting on results"),
        (name = "Archive", description = "Resolved challenges with placements and rating changes"),
    ),
    modifiers(&SecurityAddon),
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();
        components.add_security_scheme(
            "jwt",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api", routes::api_routes(&state.config))
        .split_for_parts();

    router
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api.clone()))
        .merge(Scalar::with_url("/scalar", api))
}
