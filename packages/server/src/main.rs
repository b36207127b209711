use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderName, HeaderValue, Method, header};
use common::storage::FilesystemBlobStore;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{Level, info};

use challenge_server::config::{AppConfig, CorsConfig};
use challenge_server::state::AppState;
use challenge_server::{build_router, database, jobs, mail, seed};

fn cors_layer(config: &CorsConfig) -> anyhow::Result<CorsLayer> {
    let origins = config
        .allow_origins
        .iter()
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin: {o}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::IF_NONE_MATCH,
            HeaderName::from_static("x-client-id"),
        ])
        .expose_headers([header::ETAG, header::CONTENT_DISPOSITION])
        .max_age(Duration::from_secs(config.max_age)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = database::init_db(&config.database)
        .await
        .context("Failed to connect to database")?;
    seed::seed_role_permissions(&db).await?;
    seed::ensure_indexes(&db).await?;
    seed::ensure_admin(&db, &config.auth).await?;

    let blob_store = FilesystemBlobStore::open(&config.storage.data_dir, config.storage.max_blob_size)
        .await
        .context("Failed to open blob store")?;
    let mailer = mail::build_mailer(&config.email)?;
    info!(mailer = mailer.name(), "Mailer ready");

    let cors = cors_layer(&config.server.cors)?;
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server.host/server.port")?;

    let state = AppState {
        db,
        config: Arc::new(config),
        blob_store: Arc::new(blob_store),
        blob_gate: Default::default(),
        mailer,
    };

    if state.config.jobs.enabled {
        jobs::spawn_jobs(&state);
    } else {
        info!("Background jobs disabled");
    }

    let app = build_router(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
