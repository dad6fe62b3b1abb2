// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Leaderboard assembly: join, classify, rank, and kick off refreshes.
//!
//! Reading the leaderboard has a deliberate side effect: every row
//! classified as stale (or stuck mid-refresh) is handed to the sync
//! coordinator's background queue in one batch.

use crate::db::StepsDb;
use crate::error::Result;
use crate::models::{LeaderboardRow, Participant, RowSyncStatus, StepsData, SyncStatus};
use crate::services::sync::SyncService;
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// How long a nominally "refreshing" record may run before it counts as
/// stuck.
const STUCK_REFRESH_TIMEOUT_SECS: i64 = 60;

/// A classified row plus whether its participant needs a refresh.
#[derive(Debug, Clone)]
pub struct ClassifiedRow {
    pub row: LeaderboardRow,
    pub needs_refresh: bool,
}

/// Classify one participant against its metrics record.
///
/// `needs_refresh` covers both ordinary staleness and a stuck refresh;
/// `is_refreshing` is only true while the refresh still looks live.
pub fn classify_row(
    participant: &Participant,
    steps: Option<&StepsData>,
    refresh_throttle: Duration,
    now: DateTime<Utc>,
) -> ClassifiedRow {
    let last_synced_at = steps.map(|s| s.last_synced_at.unwrap_or(s.updated_at));
    let total_steps = steps.map(|s| s.steps).unwrap_or(0);
    let status = steps.map(|s| s.status).unwrap_or_default();

    let needs_refresh = match last_synced_at {
        Some(at) => now - at > refresh_throttle,
        None => true,
    };

    let since_refresh_start = steps
        .and_then(|s| s.refresh_started_at)
        .map(|at| now - at);

    let refresh_timed_out = status == SyncStatus::Refreshing
        && since_refresh_start
            .is_some_and(|d| d > Duration::seconds(STUCK_REFRESH_TIMEOUT_SECS));

    let is_refreshing = status == SyncStatus::Refreshing
        && !refresh_timed_out
        && since_refresh_start.is_none_or(|d| d < refresh_throttle);

    let sync_status = if refresh_timed_out || needs_refresh {
        RowSyncStatus::Stale
    } else {
        RowSyncStatus::from(status)
    };

    ClassifiedRow {
        row: LeaderboardRow {
            participant_id: participant.participant_id.clone(),
            name: participant.display_name(),
            email: participant.email.clone(),
            photo: participant.photo_url.clone(),
            total_steps,
            last_synced_at: last_synced_at.map(format_utc_rfc3339),
            is_refreshing,
            sync_status,
        },
        needs_refresh: needs_refresh || refresh_timed_out,
    }
}

/// Order rows by steps descending, name ascending on ties, capped at
/// `limit`.
pub fn rank_rows(mut rows: Vec<LeaderboardRow>, limit: usize) -> Vec<LeaderboardRow> {
    rows.sort_by(|a, b| {
        b.total_steps
            .cmp(&a.total_steps)
            .then_with(|| a.name.cmp(&b.name))
    });
    rows.truncate(limit);
    rows
}

/// Leaderboard reader over the participant and metrics collections.
#[derive(Clone)]
pub struct LeaderboardService {
    db: StepsDb,
    sync: SyncService,
    refresh_throttle: Duration,
}

impl LeaderboardService {
    pub fn new(db: StepsDb, sync: SyncService, refresh_throttle: Duration) -> Self {
        Self {
            db,
            sync,
            refresh_throttle,
        }
    }

    /// Fetch the ranked leaderboard, queuing background refreshes for any
    /// stale participants as a side effect.
    ///
    /// Returns an empty list (not an error) when no store is configured.
    pub async fn fetch_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardRow>> {
        if !self.db.is_configured() {
            return Ok(Vec::new());
        }

        let participants = self.db.list_participants().await?;
        let metrics = self.db.list_steps_data().await?;
        let by_participant: HashMap<&str, &StepsData> = metrics
            .iter()
            .map(|m| (m.participant_id.as_str(), m))
            .collect();

        let now = Utc::now();
        let mut stale_ids = Vec::new();
        let mut rows = Vec::with_capacity(participants.len());

        for participant in &participants {
            let classified = classify_row(
                participant,
                by_participant
                    .get(participant.participant_id.as_str())
                    .copied(),
                self.refresh_throttle,
                now,
            );

            if classified.needs_refresh {
                stale_ids.push(participant.participant_id.clone());
            }
            rows.push(classified.row);
        }

        if !stale_ids.is_empty() {
            tracing::debug!(
                count = stale_ids.len(),
                "Scheduling background refresh for stale rows"
            );
            self.sync.queue_participant_sync(&stale_ids);
        }

        Ok(rank_rows(rows, limit))
    }

    /// Ids to target for a batch refresh: everyone when `force`, otherwise
    /// only participants past the throttle.
    pub async fn refresh_candidates(&self, force: bool) -> Result<(usize, Vec<String>)> {
        let participants = self.db.list_participants().await?;
        let total = participants.len();

        if force {
            return Ok((
                total,
                participants
                    .into_iter()
                    .map(|p| p.participant_id)
                    .collect(),
            ));
        }

        let metrics = self.db.list_steps_data().await?;
        let by_participant: HashMap<&str, &StepsData> = metrics
            .iter()
            .map(|m| (m.participant_id.as_str(), m))
            .collect();

        let now = Utc::now();
        let ids = participants
            .into_iter()
            .filter(|p| {
                match by_participant
                    .get(p.participant_id.as_str())
                    .map(|m| m.last_synced_at.unwrap_or(m.updated_at))
                {
                    Some(at) => now - at > self.refresh_throttle,
                    None => true,
                }
            })
            .map(|p| p.participant_id)
            .collect();

        Ok((total, ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THROTTLE_MINS: i64 = 30;

    fn make_participant(id: &str, name: &str) -> Participant {
        Participant {
            participant_id: id.to_string(),
            name: name.to_string(),
            email: format!("{}@example.test", id),
            photo_url: None,
            gender: None,
            google_tokens: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn make_steps(id: &str, steps: i64, now: DateTime<Utc>) -> StepsData {
        StepsData {
            participant_id: id.to_string(),
            steps,
            daily_steps: Vec::new(),
            status: SyncStatus::Ready,
            error_message: None,
            token_expired: false,
            last_synced_at: Some(now),
            refresh_started_at: None,
            daily_steps_updated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn classify(
        steps: Option<&StepsData>,
        now: DateTime<Utc>,
    ) -> ClassifiedRow {
        classify_row(
            &make_participant("p1", "Asha"),
            steps,
            Duration::minutes(THROTTLE_MINS),
            now,
        )
    }

    #[test]
    fn missing_metrics_means_zero_steps_and_stale() {
        let now = Utc::now();
        let classified = classify(None, now);

        assert_eq!(classified.row.total_steps, 0);
        assert_eq!(classified.row.sync_status, RowSyncStatus::Stale);
        assert!(classified.needs_refresh);
        assert!(!classified.row.is_refreshing);
    }

    #[test]
    fn fresh_sync_classifies_ready() {
        let now = Utc::now();
        let steps = make_steps("p1", 12000, now - Duration::minutes(1));
        let classified = classify(Some(&steps), now);

        assert_eq!(classified.row.sync_status, RowSyncStatus::Ready);
        assert!(!classified.needs_refresh);
    }

    #[test]
    fn sync_older_than_throttle_is_stale() {
        let now = Utc::now();
        let steps = make_steps("p1", 12000, now - Duration::minutes(THROTTLE_MINS + 1));
        let classified = classify(Some(&steps), now);

        assert_eq!(classified.row.sync_status, RowSyncStatus::Stale);
        assert!(classified.needs_refresh);
    }

    #[test]
    fn last_synced_falls_back_to_updated_at() {
        let now = Utc::now();
        let mut steps = make_steps("p1", 100, now);
        steps.last_synced_at = None;
        steps.updated_at = now - Duration::minutes(5);

        let classified = classify(Some(&steps), now);
        assert!(!classified.needs_refresh);
    }

    #[test]
    fn refresh_stuck_for_61s_is_reclassified_stale() {
        let now = Utc::now();
        let mut steps = make_steps("p1", 100, now - Duration::minutes(1));
        steps.status = SyncStatus::Refreshing;
        steps.refresh_started_at = Some(now - Duration::seconds(61));

        let classified = classify(Some(&steps), now);
        assert_eq!(classified.row.sync_status, RowSyncStatus::Stale);
        assert!(classified.needs_refresh);
        assert!(!classified.row.is_refreshing);
    }

    #[test]
    fn refresh_running_for_59s_still_counts_as_refreshing() {
        let now = Utc::now();
        let mut steps = make_steps("p1", 100, now - Duration::minutes(1));
        steps.status = SyncStatus::Refreshing;
        steps.refresh_started_at = Some(now - Duration::seconds(59));

        let classified = classify(Some(&steps), now);
        assert_eq!(classified.row.sync_status, RowSyncStatus::Refreshing);
        assert!(!classified.needs_refresh);
        assert!(classified.row.is_refreshing);
    }

    #[test]
    fn error_status_survives_when_not_stale() {
        let now = Utc::now();
        let mut steps = make_steps("p1", 100, now - Duration::minutes(1));
        steps.status = SyncStatus::Error;
        steps.error_message = Some("upstream broke".to_string());

        let classified = classify(Some(&steps), now);
        assert_eq!(classified.row.sync_status, RowSyncStatus::Error);
    }

    #[test]
    fn ranking_sorts_by_steps_then_name() {
        let now = Utc::now();
        let rows: Vec<LeaderboardRow> = [("c", 500), ("a", 900), ("b", 900), ("d", 100)]
            .into_iter()
            .map(|(name, steps)| {
                let participant = make_participant(name, name);
                let data = make_steps(name, steps, now);
                classify_row(&participant, Some(&data), Duration::minutes(30), now).row
            })
            .collect();

        let ranked = rank_rows(rows, 3);
        let names: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
