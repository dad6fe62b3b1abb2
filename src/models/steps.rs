//! Step metrics stored per participant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sync state of a participant's metrics record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Ready,
    Refreshing,
    Error,
}

/// One day of measured steps inside the challenge window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStepBreakdown {
    /// Calendar date in the challenge timezone (`YYYY-MM-DD`)
    pub date: String,
    pub steps: i64,
    pub start_time_millis: i64,
    pub end_time_millis: i64,
    /// Data stream that contributed the measurement
    pub source: Option<String>,
}

/// Steps metrics record, one per participant.
///
/// Written by the sync coordinator (and the daily detail write-through);
/// read by the leaderboard. Never deleted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepsData {
    /// Participant ID (also used as document ID)
    pub participant_id: String,
    /// Total steps over the challenge window
    #[serde(default)]
    pub steps: i64,
    /// Per-day breakdown backing the detail view
    #[serde(default)]
    pub daily_steps: Vec<DailyStepBreakdown>,
    #[serde(default)]
    pub status: SyncStatus,
    pub error_message: Option<String>,
    /// Set when the last failure looked like an expired or revoked
    /// credential; drives the "please reconnect" hint in the UI.
    #[serde(default)]
    pub token_expired: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub refresh_started_at: Option<DateTime<Utc>>,
    pub daily_steps_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepsData {
    /// Fresh record for a participant's first sync attempt.
    pub fn new_refreshing(participant_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            participant_id: participant_id.to_string(),
            steps: 0,
            daily_steps: Vec::new(),
            status: SyncStatus::Refreshing,
            error_message: None,
            token_expired: false,
            last_synced_at: None,
            refresh_started_at: Some(now),
            daily_steps_updated_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}
