mod db;
mod domain;
mod error;
mod middleware;
mod services;
mod state;
mod web;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::db::PgStore;
use crate::middleware::RateLimiter;
use crate::services::llm::{LlmConfig, OpenRouterClient, PromptConfig};
use crate::services::report::ReportService;
use crate::state::SharedState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL missing");
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run database migrations: {}", e);
            e
        })?;
    tracing::info!("Database migrations completed");

    let prompt_path =
        std::env::var("PROMPT_CONFIG_PATH").unwrap_or_else(|_| "prompt.json".to_string());
    let prompts = Arc::new(PromptConfig::load(&prompt_path));

    let llm_config = LlmConfig::from_env();
    if llm_config.api_key.is_none() {
        tracing::warn!("LLM_API_KEY not set, reports will use the local narrative fallback");
    }
    let client = Arc::new(OpenRouterClient::new(&llm_config));
    let store = Arc::new(PgStore::new(pool.clone()));
    let reports = Arc::new(ReportService::new(store, client, llm_config, prompts));

    let limiter = RateLimiter::from_env();
    let sweeper = limiter.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(300)).await;
            sweeper.sweep().await;
        }
    });

    let shared: SharedState = Arc::new(state::AppState {
        pool,
        reports,
        limiter,
    });

    let app = Router::new()
        .merge(web::routes(shared.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| {
        let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
        format!("0.0.0.0:{}", port)
    });
    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}
