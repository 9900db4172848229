// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! VidTube API Server
//!
//! Serves account registration, login and token-based sessions for the
//! video-sharing frontend.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidtube::{
    config::{Config, StoreBackend},
    db::{FirestoreUserStore, MemoryUserStore, UserStore},
    services::CloudinaryStorage,
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting VidTube API");

    let store: Arc<dyn UserStore> = match config.store_backend {
        StoreBackend::Firestore => {
            Arc::new(FirestoreUserStore::new(&config.gcp_project_id).await?)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory user store; data is lost on restart");
            Arc::new(MemoryUserStore::new())
        }
    };

    let storage = Arc::new(CloudinaryStorage::new(&config.storage)?);
    tracing::info!(
        cloud_name = %config.storage.cloud_name,
        timeout_secs = config.storage.timeout.as_secs(),
        "Object storage initialized"
    );

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), store, storage)?);

    // Build router
    let app = vidtube::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,vidtube=debug"));

    tracing_subscriber::registry().with(filter).with(format).init();
}
