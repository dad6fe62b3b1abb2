//! Cached per-day breakdowns with TTL-based staleness.
//!
//! The cache is independent of the metrics record: the detail view reads
//! it first and only hits Google Fit when the snapshot has gone stale.

use crate::models::steps::DailyStepBreakdown;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a cached breakdown stays fresh.
const DAILY_CACHE_TTL_MINS: i64 = 60;

/// Cached daily-steps snapshot, one per participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStepsCache {
    /// Participant ID (also used as document ID)
    pub participant_id: String,
    #[serde(default)]
    pub daily_steps: Vec<DailyStepBreakdown>,
    /// Last fetch attempt, successful or not
    pub last_fetch_at: Option<DateTime<Utc>>,
    /// Last successful fetch
    pub last_success_at: Option<DateTime<Utc>>,
    /// Consecutive failures since the last success
    #[serde(default)]
    pub error_count: u32,
    pub last_error: Option<String>,
}

/// Whether the detail view should hit Google Fit instead of the cache.
///
/// Fresh data is needed when there is no cache at all, when the snapshot
/// has aged past the TTL, or when the record has only ever seen failures.
pub fn should_fetch_fresh(cache: Option<&DailyStepsCache>, now: DateTime<Utc>) -> bool {
    let Some(cache) = cache else {
        return true;
    };

    let expired = cache
        .last_fetch_at
        .is_none_or(|at| now - at > Duration::minutes(DAILY_CACHE_TTL_MINS));
    let never_succeeded = cache.last_success_at.is_none() && cache.error_count > 0;

    expired || never_succeeded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cache(now: DateTime<Utc>, age_mins: i64) -> DailyStepsCache {
        DailyStepsCache {
            participant_id: "p1".to_string(),
            daily_steps: vec![DailyStepBreakdown {
                date: "2025-10-07".to_string(),
                steps: 4200,
                start_time_millis: 0,
                end_time_millis: 0,
                source: None,
            }],
            last_fetch_at: Some(now - Duration::minutes(age_mins)),
            last_success_at: Some(now - Duration::minutes(age_mins)),
            error_count: 0,
            last_error: None,
        }
    }

    #[test]
    fn missing_cache_needs_fetch() {
        assert!(should_fetch_fresh(None, Utc::now()));
    }

    #[test]
    fn fresh_cache_is_served() {
        let now = Utc::now();
        assert!(!should_fetch_fresh(Some(&make_cache(now, 5)), now));
    }

    #[test]
    fn cache_past_ttl_needs_fetch() {
        let now = Utc::now();
        assert!(should_fetch_fresh(Some(&make_cache(now, 90)), now));
    }

    #[test]
    fn never_successful_cache_retries_despite_recent_fetch() {
        let now = Utc::now();
        let cache = DailyStepsCache {
            participant_id: "p1".to_string(),
            daily_steps: Vec::new(),
            last_fetch_at: Some(now - Duration::minutes(1)),
            last_success_at: None,
            error_count: 3,
            last_error: Some("boom".to_string()),
        };
        assert!(should_fetch_fresh(Some(&cache), now));
    }
}
