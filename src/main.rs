// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Step Rally API Server
//!
//! Serves the fitness-challenge leaderboard backed by Google Fit step
//! counts synced into Firestore.

use std::sync::Arc;
use step_rally::{
    config::Config,
    db::StepsDb,
    services::{GoogleFitClient, LeaderboardService, SyncService},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Step Rally API");

    // Initialize Firestore database (degraded mode without a project id)
    let db = match config.gcp_project_id.as_deref() {
        Some(project_id) => StepsDb::new(project_id)
            .await
            .expect("Failed to connect to Firestore"),
        None => {
            tracing::warn!("GCP_PROJECT_ID not set; running without a data store");
            StepsDb::unconfigured()
        }
    };

    // Initialize Google Fit client and sync services
    let fit = GoogleFitClient::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    );
    let sync = SyncService::new(db.clone(), fit.clone());
    let leaderboard = LeaderboardService::new(db.clone(), sync.clone(), config.refresh_throttle);
    tracing::info!("Sync services initialized");

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        fit,
        sync,
        leaderboard,
    });

    // Build router
    let app = step_rally::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("step_rally=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
