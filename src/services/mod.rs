// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod google_fit;
pub mod leaderboard;
pub mod participants;
pub mod sync;

pub use google_fit::{FitError, GoogleFitClient};
pub use leaderboard::LeaderboardService;
pub use sync::{RefreshStats, SyncService};
