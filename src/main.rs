mod analytics;
mod config;
mod db;
mod domain;
mod error;
mod middleware;
mod services;
mod state;
mod time_utils;
mod web;

#[cfg(test)]
mod testing;

use crate::config::AppConfig;
use crate::db::{seed, MemoryStore, PgStore, Store};
use crate::middleware::RateLimiter;
use crate::services::tables::TableRegistry;
use crate::state::{AppState, SharedState};
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOGIN_ATTEMPTS: usize = 5;
const LOGIN_WINDOW_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(database_url)
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
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    seed::seed_all(store.as_ref(), config.admin.as_ref()).await?;

    let registry = TableRegistry::standard()?;
    let login_limiter = RateLimiter::new(LOGIN_ATTEMPTS, LOGIN_WINDOW_SECS);

    let shared: SharedState = Arc::new(AppState {
        store,
        registry: Arc::new(registry),
        zone: config.zone,
        session_key: config.session_key.clone(),
        login_limiter: login_limiter.clone(),
        secure_cookie: config.production,
    });

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(login_limiter.window());
        loop {
            ticker.tick().await;
            login_limiter.cleanup().await;
        }
    });

    // Production serves the UI from the same origin.
    let cors = if config.production {
        CorsLayer::new()
    } else {
        CorsLayer::permissive()
    };

    let app = Router::new()
        .merge(web::routes(shared))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
