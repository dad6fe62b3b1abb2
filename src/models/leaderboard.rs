//! Derived leaderboard rows (computed on read, never stored).

use crate::models::steps::SyncStatus;
use serde::Serialize;

/// Sync status as shown to the UI; extends the stored status with `stale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowSyncStatus {
    Ready,
    Refreshing,
    Error,
    Stale,
}

impl From<SyncStatus> for RowSyncStatus {
    fn from(status: SyncStatus) -> Self {
        match status {
            SyncStatus::Ready => Self::Ready,
            SyncStatus::Refreshing => Self::Refreshing,
            SyncStatus::Error => Self::Error,
        }
    }
}

/// One ranked leaderboard entry: participant joined with step metrics.
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub participant_id: String,
    pub name: String,
    pub email: String,
    pub photo: Option<String>,
    pub total_steps: i64,
    pub last_synced_at: Option<String>,
    /// True only while a refresh still looks live (not stuck)
    pub is_refreshing: bool,
    pub sync_status: RowSyncStatus,
}
