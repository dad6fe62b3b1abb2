// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Challenge window constants.
//!
//! The challenge runs over a fixed date range in its home timezone (IST);
//! every aggregation request and daily bucket is aligned to these instants.

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::LazyLock;

/// Home timezone of the challenge; daily bucket dates are rendered in it.
pub const CHALLENGE_TIMEZONE: Tz = chrono_tz::Asia::Kolkata;

const CHALLENGE_YEAR: i32 = 2025;
const CHALLENGE_MONTH: u32 = 10;

/// First instant of the challenge (midnight IST on day one).
pub static CHALLENGE_START: LazyLock<DateTime<Utc>> = LazyLock::new(|| {
    CHALLENGE_TIMEZONE
        .with_ymd_and_hms(CHALLENGE_YEAR, CHALLENGE_MONTH, 6, 0, 0, 0)
        .single()
        .expect("challenge start is a valid IST instant")
        .with_timezone(&Utc)
});

/// Last instant of the challenge (end of the final day, IST).
pub static CHALLENGE_END: LazyLock<DateTime<Utc>> = LazyLock::new(|| {
    CHALLENGE_TIMEZONE
        .with_ymd_and_hms(CHALLENGE_YEAR, CHALLENGE_MONTH, 30, 23, 59, 59)
        .single()
        .expect("challenge end is a valid IST instant")
        .with_timezone(&Utc)
        + Duration::milliseconds(999)
});

/// Challenge window as epoch millis, the form the aggregation API takes.
pub fn challenge_window_millis() -> (i64, i64) {
    (
        CHALLENGE_START.timestamp_millis(),
        CHALLENGE_END.timestamp_millis(),
    )
}
