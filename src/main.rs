mod auth;
mod config;
mod db;
mod errors;
mod inference;
mod models;
mod routes;
mod service;
mod state;
mod stream;

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::memory_store::MemoryChatStore;
use crate::db::pg_store::PgChatStore;
use crate::db::ChatStore;
use crate::inference::InferenceClient;
use crate::routes::build_router;
use crate::service::relay_service::RelayService;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stream_chat=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    // ── Persistence ───────────────────────────────────────────────────────────
    let store: Arc<dyn ChatStore> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await
                .context("Failed to connect to PostgreSQL")?;

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;

            info!("Database connection established and migrations applied");
            Arc::new(PgChatStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, conversations are kept in memory only");
            Arc::new(MemoryChatStore::new())
        }
    };

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let inference = InferenceClient::new(
        &config.inference_base_url,
        config.connect_retries,
        config.retry_backoff,
    );
    info!("Relaying turns to {}", inference.process_url());

    let relay = RelayService::new(store, inference);
    let app = build_router(AppState::new(relay, &config.auth_header), &config.cors_origin);

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
