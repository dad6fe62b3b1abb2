// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Step Rally: fitness-challenge leaderboard backend
//!
//! This crate provides the backend API for syncing participant step
//! counts from Google Fit and serving a ranked challenge leaderboard.

pub mod challenge;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::StepsDb;
use services::{GoogleFitClient, LeaderboardService, SyncService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: StepsDb,
    pub fit: GoogleFitClient,
    pub sync: SyncService,
    pub leaderboard: LeaderboardService,
}
