// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod daily_cache;
pub mod leaderboard;
pub mod participant;
pub mod steps;

pub use daily_cache::DailyStepsCache;
pub use leaderboard::{LeaderboardRow, RowSyncStatus};
pub use participant::{GoogleTokens, Participant};
pub use steps::{DailyStepBreakdown, StepsData, SyncStatus};
