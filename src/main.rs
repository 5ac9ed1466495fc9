//! Check Run Service - Main Application Entry Point
//!
//! This is a REST API server for accounts-payable check runs. A check run
//! collects outstanding purchase invoices, journal entries and expense claims
//! for one bank account, lets the user flag which to pay, and turns the
//! flagged rows into payment entries with consecutive check numbers.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Storage seam**: `CheckRunStore` trait; services never touch SQL
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;
mod store;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers::AppState, store::postgres::PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
    };
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// All routes with their middleware.
fn build_router(state: AppState) -> Router {
    let check_run_routes = Router::new()
        .route(
            "/api/v1/check-runs/draft",
            post(handlers::check_runs::find_or_create_draft),
        )
        .route(
            "/api/v1/check-runs/{id}",
            get(handlers::check_runs::get_check_run).put(handlers::check_runs::save_check_run),
        )
        .route(
            "/api/v1/check-runs/{id}/last-check-number",
            post(handlers::check_runs::set_last_check_number),
        )
        .route(
            "/api/v1/check-runs/{id}/default-payable-account",
            post(handlers::check_runs::set_default_payable_account),
        )
        .route(
            "/api/v1/check-runs/{id}/entries",
            get(handlers::check_runs::get_entries),
        )
        .route(
            "/api/v1/check-runs/{id}/settings",
            get(handlers::settings::get_settings).put(handlers::settings::update_settings),
        )
        .route(
            "/api/v1/check-runs/{id}/process",
            post(handlers::check_runs::process_check_run),
        )
        .route(
            "/api/v1/check-runs/{id}/payment-entries",
            get(handlers::check_runs::list_payment_entries),
        );

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(check_run_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
