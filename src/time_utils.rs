// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use crate::challenge::CHALLENGE_TIMEZONE;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format an epoch-millis instant as `YYYY-MM-DD` in the challenge timezone.
///
/// Stored dates must not depend on the server's locale or local timezone.
pub fn format_challenge_date(millis: i64) -> String {
    CHALLENGE_TIMEZONE
        .timestamp_millis_opt(millis)
        .earliest()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
