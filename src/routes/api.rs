// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes: leaderboard, participant daily detail, and sync control.

use crate::error::{AppError, Result};
use crate::models::daily_cache::should_fetch_fresh;
use crate::models::{DailyStepBreakdown, GoogleTokens, LeaderboardRow};
use crate::services::participants::{upsert_participant, JoinOutcome, SignInRequest};
use crate::services::sync::RefreshStats;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/participants", post(join_challenge))
        .route(
            "/api/participants/{participant_id}/daily",
            get(get_participant_daily),
        )
        .route("/api/refresh", get(refresh_all))
}

// ─── Leaderboard ─────────────────────────────────────────────

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 500;

#[derive(Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
}

/// Ranked leaderboard; empty (not an error) when no store is configured.
async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardRow>>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let rows = state.leaderboard.fetch_leaderboard(limit).await?;
    Ok(Json(rows))
}

// ─── Participant Daily Breakdown ─────────────────────────────

#[derive(Serialize)]
struct DailyStepsResponse {
    participant_id: String,
    daily_steps: Vec<DailyStepBreakdown>,
    from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    warning: Option<String>,
}

/// Per-day steps for one participant, served from cache when fresh.
///
/// A live fetch writes through to both the metrics record and the cache;
/// when it fails, previously cached data is returned with a warning.
async fn get_participant_daily(
    State(state): State<Arc<AppState>>,
    Path(participant_id): Path<String>,
) -> Result<Json<DailyStepsResponse>> {
    if !state.db.is_configured() {
        return Err(AppError::NotConfigured);
    }

    let participant = state
        .db
        .get_participant(&participant_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Participant {} not found", participant_id)))?;

    let Some(tokens) = participant
        .google_tokens
        .as_ref()
        .filter(|t| t.has_refresh_token())
    else {
        return Err(AppError::BadRequest(
            "Participant is not linked to Google Fit".to_string(),
        ));
    };

    let cache = state.db.get_daily_cache(&participant_id).await?;
    let now = Utc::now();

    if !should_fetch_fresh(cache.as_ref(), now) {
        if let Some(cache) = &cache {
            tracing::debug!(participant_id = %participant_id, "Serving daily steps from cache");
            return Ok(Json(DailyStepsResponse {
                participant_id,
                daily_steps: cache.daily_steps.clone(),
                from_cache: true,
                warning: None,
            }));
        }
    }

    match fetch_and_store_daily(&state, &participant_id, tokens).await {
        Ok(daily_steps) => Ok(Json(DailyStepsResponse {
            participant_id,
            daily_steps,
            from_cache: false,
            warning: None,
        })),
        Err(err) => {
            tracing::warn!(
                participant_id = %participant_id,
                error = %err,
                "Live daily-steps fetch failed"
            );

            if let Err(cache_err) = state
                .db
                .record_daily_cache_failure(&participant_id, &err.to_string(), Utc::now())
                .await
            {
                tracing::error!(
                    participant_id = %participant_id,
                    error = %cache_err,
                    "Failed to record cache failure"
                );
            }

            // Prefer outdated data over no data.
            match cache.filter(|c| !c.daily_steps.is_empty()) {
                Some(cache) => Ok(Json(DailyStepsResponse {
                    participant_id,
                    daily_steps: cache.daily_steps,
                    from_cache: true,
                    warning: Some("Data may be outdated due to sync failure".to_string()),
                })),
                None => Err(err),
            }
        }
    }
}

/// Live fetch with write-through to the metrics record and daily cache.
async fn fetch_and_store_daily(
    state: &AppState,
    participant_id: &str,
    tokens: &GoogleTokens,
) -> Result<Vec<DailyStepBreakdown>> {
    let ensured = state.fit.ensure_access_token(tokens).await?;
    let summary = state
        .fit
        .fetch_challenge_step_summary(&ensured.access_token)
        .await?;

    let now = Utc::now();
    state
        .db
        .write_sync_success(participant_id, summary.total_steps, &summary.daily_steps, now)
        .await?;
    state
        .db
        .set_daily_cache_success(participant_id, &summary.daily_steps, now)
        .await?;
    if ensured.refreshed {
        state
            .db
            .set_participant_tokens(participant_id, &ensured.tokens, now)
            .await?;
    }

    Ok(summary.daily_steps)
}

// ─── Batch Refresh ───────────────────────────────────────────

#[derive(Deserialize)]
struct RefreshQuery {
    force_refresh: Option<bool>,
}

#[derive(Serialize)]
struct RefreshResponse {
    total_participants: usize,
    force_refresh: bool,
    stats: RefreshStats,
}

/// Refresh all (or only stale) participants and wait for the batch.
async fn refresh_all(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RefreshQuery>,
) -> Result<Json<RefreshResponse>> {
    if !state.db.is_configured() {
        return Err(AppError::NotConfigured);
    }

    let force_refresh = params.force_refresh.unwrap_or(true);
    let (total_participants, ids) = state.leaderboard.refresh_candidates(force_refresh).await?;

    let stats = if ids.is_empty() {
        RefreshStats::default()
    } else {
        state.sync.refresh_participants_by_ids(&ids).await?
    };

    tracing::info!(
        total_participants,
        targeted = ids.len(),
        successful = stats.successful_syncs,
        failed = stats.failed_syncs,
        "Batch refresh finished"
    );

    Ok(Json(RefreshResponse {
        total_participants,
        force_refresh,
        stats,
    }))
}

// ─── Sign-in Upsert ──────────────────────────────────────────

/// Create or update a participant after an OAuth sign-in.
async fn join_challenge(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignInRequest>,
) -> Result<Json<JoinOutcome>> {
    if !state.db.is_configured() {
        return Err(AppError::NotConfigured);
    }

    let outcome = upsert_participant(&state.db, &state.sync, request).await?;
    Ok(Json(outcome))
}
