// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use std::sync::Arc;
use step_rally::config::Config;
use step_rally::db::StepsDb;
use step_rally::routes::create_router;
use step_rally::services::{GoogleFitClient, LeaderboardService, SyncService};
use step_rally::AppState;

/// Create an offline (unconfigured) database handle.
#[allow(dead_code)]
pub fn test_db_offline() -> StepsDb {
    StepsDb::unconfigured()
}

/// Create a test app with an offline data store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let db = test_db_offline();
    let fit = GoogleFitClient::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
    );
    let sync = SyncService::new(db.clone(), fit.clone());
    let leaderboard = LeaderboardService::new(db.clone(), sync.clone(), config.refresh_throttle);

    let state = Arc::new(AppState {
        config,
        db,
        fit,
        sync,
        leaderboard,
    });

    (create_router(state.clone()), state)
}
