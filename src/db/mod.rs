//! Database layer (Firestore).

pub mod firestore;

pub use firestore::StepsDb;

/// Collection names as constants.
pub mod collections {
    pub const PARTICIPANTS: &str = "participants";
    /// One metrics record per participant (keyed by participant_id)
    pub const STEPS_DATA: &str = "steps_data";
    /// TTL'd per-day breakdown snapshots (keyed by participant_id)
    pub const DAILY_CACHE: &str = "daily_steps_cache";
}
