// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync coordinator: batches and de-duplicates participant refreshes.
//!
//! The refresh flow per participant:
//! 1. Mark the metrics record `refreshing`
//! 2. Ensure a usable access token (refreshing the grant if needed)
//! 3. Fetch the challenge step summary from Google Fit
//! 4. Persist results (and rotated credentials) back to Firestore
//!
//! Failures are isolated per participant; a batch always runs to
//! completion and reports aggregate stats.

use crate::db::StepsDb;
use crate::error::AppError;
use crate::models::Participant;
use crate::services::google_fit::{FitError, GoogleFitClient};
use chrono::Utc;
use dashmap::DashSet;
use futures_util::{stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Concurrent upstream syncs per batch.
const MAX_CONCURRENT_SYNCS: usize = 8;

/// Aggregate outcome of one refresh batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshStats {
    pub total_attempted: u32,
    pub tokens_refreshed: u32,
    pub successful_syncs: u32,
    pub failed_syncs: u32,
    pub failed_participants: Vec<String>,
}

/// Failure inside one participant's refresh flow.
#[derive(Debug, thiserror::Error)]
enum SyncError {
    #[error(transparent)]
    Fit(#[from] FitError),

    #[error("{0}")]
    Db(String),
}

impl From<AppError> for SyncError {
    fn from(err: AppError) -> Self {
        SyncError::Db(err.to_string())
    }
}

impl SyncError {
    fn is_token_expired(&self) -> bool {
        match self {
            SyncError::Fit(err) => err.is_token_expired(),
            SyncError::Db(_) => false,
        }
    }
}

/// Outcome of one participant's refresh, collected into stats.
struct SyncOutcome {
    participant_id: String,
    /// `Ok(token_refreshed)` or the failure text
    result: Result<bool, String>,
}

/// Releases claimed participant ids when a batch finishes, however it
/// finishes.
struct PendingClaim {
    pending: Arc<DashSet<String>>,
    ids: Vec<String>,
}

impl Drop for PendingClaim {
    fn drop(&mut self) {
        for id in &self.ids {
            self.pending.remove(id);
        }
    }
}

/// Sync coordinator with an in-process pending set and a background
/// worker.
///
/// The pending set guarantees at most one in-flight sync per participant
/// within this process; the guarantee does not extend across replicas.
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct SyncService {
    db: StepsDb,
    fit: GoogleFitClient,
    pending: Arc<DashSet<String>>,
    queue_tx: mpsc::UnboundedSender<Vec<String>>,
}

impl SyncService {
    /// Create the service and spawn its background worker.
    pub fn new(db: StepsDb, fit: GoogleFitClient) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let service = Self {
            db,
            fit,
            pending: Arc::new(DashSet::new()),
            queue_tx,
        };
        service.spawn_worker(queue_rx);
        service
    }

    fn spawn_worker(&self, mut queue_rx: mpsc::UnboundedReceiver<Vec<String>>) {
        let worker = self.clone();
        tokio::spawn(async move {
            while let Some(ids) = queue_rx.recv().await {
                let claim = PendingClaim {
                    pending: Arc::clone(&worker.pending),
                    ids: ids.clone(),
                };

                match worker.refresh_claimed(&ids).await {
                    Ok(stats) => tracing::info!(
                        total_attempted = stats.total_attempted,
                        successful = stats.successful_syncs,
                        failed = stats.failed_syncs,
                        tokens_refreshed = stats.tokens_refreshed,
                        "Background sync batch finished"
                    ),
                    Err(err) => tracing::error!(error = %err, "Background sync batch failed"),
                }

                drop(claim);
            }
        });
    }

    /// Queue a background sync for the given participants.
    ///
    /// Ids already queued or in flight are dropped silently. Never blocks
    /// the caller.
    pub fn queue_participant_sync(&self, ids: &[String]) {
        let claimed = self.claim_ids(ids);
        if claimed.is_empty() {
            return;
        }

        tracing::debug!(count = claimed.len(), "Queuing participant sync");

        if self.queue_tx.send(claimed.clone()).is_err() {
            // Worker is gone; release the claims.
            for id in &claimed {
                self.pending.remove(id);
            }
            tracing::error!("Sync worker channel closed; dropping queued sync");
        }
    }

    /// Refresh the given participants now, waiting for the whole batch.
    ///
    /// Ids with a sync already in flight are dropped silently and
    /// excluded from the stats.
    pub async fn refresh_participants_by_ids(
        &self,
        ids: &[String],
    ) -> Result<RefreshStats, AppError> {
        let claimed = self.claim_ids(ids);
        if claimed.is_empty() {
            return Ok(RefreshStats::default());
        }

        let _claim = PendingClaim {
            pending: Arc::clone(&self.pending),
            ids: claimed.clone(),
        };

        self.refresh_claimed(&claimed).await
    }

    /// Claim ids not already pending. Claims are inserted synchronously,
    /// before any await point, and must be released by a `PendingClaim`.
    fn claim_ids(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .filter(|id| self.pending.insert((*id).clone()))
            .cloned()
            .collect()
    }

    /// Run the refresh flow for already-claimed ids.
    async fn refresh_claimed(&self, ids: &[String]) -> Result<RefreshStats, AppError> {
        let participants = self.db.find_participants_by_ids(ids).await?;
        if participants.is_empty() {
            return Ok(RefreshStats::default());
        }

        let now = Utc::now();
        for participant in &participants {
            self.db
                .mark_refreshing(&participant.participant_id, now)
                .await?;
        }

        let outcomes: Vec<SyncOutcome> = stream::iter(participants)
            .map(|participant| self.refresh_participant(participant))
            .buffer_unordered(MAX_CONCURRENT_SYNCS)
            .collect()
            .await;

        let mut stats = RefreshStats {
            total_attempted: outcomes.len() as u32,
            ..Default::default()
        };

        for outcome in outcomes {
            match outcome.result {
                Ok(token_refreshed) => {
                    stats.successful_syncs += 1;
                    if token_refreshed {
                        stats.tokens_refreshed += 1;
                    }
                }
                Err(_) => {
                    stats.failed_syncs += 1;
                    stats.failed_participants.push(outcome.participant_id);
                }
            }
        }

        Ok(stats)
    }

    /// Refresh one participant; failures are recorded, never propagated.
    async fn refresh_participant(&self, participant: Participant) -> SyncOutcome {
        let participant_id = participant.participant_id.clone();

        match self.sync_one(&participant).await {
            Ok(token_refreshed) => SyncOutcome {
                participant_id,
                result: Ok(token_refreshed),
            },
            Err(err) => {
                tracing::warn!(
                    participant_id = %participant_id,
                    error = %err,
                    token_expired = err.is_token_expired(),
                    "Participant sync failed"
                );

                let now = Utc::now();
                if let Err(db_err) = self
                    .db
                    .write_sync_error(&participant_id, &err.to_string(), err.is_token_expired(), now)
                    .await
                {
                    tracing::error!(
                        participant_id = %participant_id,
                        error = %db_err,
                        "Failed to record sync error"
                    );
                }

                SyncOutcome {
                    participant_id,
                    result: Err(err.to_string()),
                }
            }
        }
    }

    async fn sync_one(&self, participant: &Participant) -> Result<bool, SyncError> {
        let tokens = participant
            .google_tokens
            .as_ref()
            .filter(|t| t.has_refresh_token())
            .ok_or(SyncError::Fit(FitError::MissingRefreshToken))?;

        let ensured = self.fit.ensure_access_token(tokens).await?;
        let summary = self
            .fit
            .fetch_challenge_step_summary(&ensured.access_token)
            .await?;

        let now = Utc::now();
        self.db
            .write_sync_success(
                &participant.participant_id,
                summary.total_steps,
                &summary.daily_steps,
                now,
            )
            .await?;

        if ensured.refreshed {
            self.db
                .set_participant_tokens(&participant.participant_id, &ensured.tokens, now)
                .await?;
        }

        tracing::info!(
            participant_id = %participant.participant_id,
            total_steps = summary.total_steps,
            days = summary.daily_steps.len(),
            token_refreshed = ensured.refreshed,
            "Participant synced"
        );

        Ok(ensured.refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> SyncService {
        SyncService::new(
            StepsDb::unconfigured(),
            GoogleFitClient::new("id".to_string(), "secret".to_string()),
        )
    }

    #[tokio::test]
    async fn claimed_ids_are_not_claimed_twice() {
        let service = test_service();
        let ids = vec!["p1".to_string(), "p2".to_string()];

        let first = service.claim_ids(&ids);
        assert_eq!(first.len(), 2);

        let second = service.claim_ids(&ids);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn refresh_is_a_noop_for_in_flight_ids() {
        let service = test_service();
        let ids = vec!["p1".to_string()];

        // Simulate an in-flight sync holding the claim.
        let claimed = service.claim_ids(&ids);
        let _claim = PendingClaim {
            pending: Arc::clone(&service.pending),
            ids: claimed,
        };

        let stats = service
            .refresh_participants_by_ids(&ids)
            .await
            .expect("no-op refresh should succeed");
        assert_eq!(stats.total_attempted, 0);
        assert_eq!(stats.successful_syncs, 0);
        assert_eq!(stats.failed_syncs, 0);
    }

    #[tokio::test]
    async fn queue_drops_in_flight_ids_silently() {
        let service = test_service();
        let ids = vec!["p1".to_string()];

        let claimed = service.claim_ids(&ids);
        let _claim = PendingClaim {
            pending: Arc::clone(&service.pending),
            ids: claimed,
        };

        // Nothing new to claim, so nothing reaches the worker.
        service.queue_participant_sync(&ids);
        assert!(service.pending.contains("p1"));
        assert_eq!(service.pending.len(), 1);
    }

    #[tokio::test]
    async fn claims_are_released_on_drop() {
        let service = test_service();
        let ids = vec!["p1".to_string()];

        {
            let claimed = service.claim_ids(&ids);
            let _claim = PendingClaim {
                pending: Arc::clone(&service.pending),
                ids: claimed,
            };
            assert!(service.pending.contains("p1"));
        }

        assert!(!service.pending.contains("p1"));
        assert_eq!(service.claim_ids(&ids).len(), 1);
    }

    #[tokio::test]
    async fn failed_batch_releases_claims() {
        let service = test_service();
        let ids = vec!["p1".to_string()];

        // The unconfigured store makes the batch fail outright; the claim
        // must still be released so a retry is possible.
        assert!(service.refresh_participants_by_ids(&ids).await.is_err());
        assert!(!service.pending.contains("p1"));
        assert!(service.refresh_participants_by_ids(&ids).await.is_err());
    }
}
