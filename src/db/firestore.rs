// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Participants (profile + OAuth credentials)
//! - Steps data (one metrics record per participant)
//! - Daily-steps cache (TTL'd breakdown snapshots)
//!
//! Updates that touch a shared record use field masks rather than
//! whole-document replacement, so concurrent writers of unrelated fields
//! do not clobber each other. There are no cross-document transactions.

use crate::db::collections;
use crate::error::AppError;
use crate::models::{
    DailyStepBreakdown, DailyStepsCache, GoogleTokens, Participant, StepsData, SyncStatus,
};
use chrono::{DateTime, Utc};
use firestore::{path, paths};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};

const MAX_CONCURRENT_DB_OPS: usize = 16;

/// Firestore database client.
///
/// Constructed via [`StepsDb::unconfigured`], every operation returns
/// `AppError::NotConfigured`; callers that can degrade gracefully check
/// [`StepsDb::is_configured`] first.
#[derive(Clone)]
pub struct StepsDb {
    client: Option<firestore::FirestoreDb>,
}

impl StepsDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated
        // connection to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Client for deployments without a data store (and for tests).
    pub fn unconfigured() -> Self {
        Self { client: None }
    }

    /// Whether a data store connection is configured.
    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    /// Helper to get the client or fail when no store is configured.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client.as_ref().ok_or(AppError::NotConfigured)
    }

    // ─── Participant Operations ──────────────────────────────────

    /// Get a participant by ID.
    pub async fn get_participant(
        &self,
        participant_id: &str,
    ) -> Result<Option<Participant>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::PARTICIPANTS)
            .obj()
            .one(participant_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a participant by lowercased email.
    pub async fn find_participant_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Participant>, AppError> {
        let email = email.to_string();
        let matches: Vec<Participant> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::PARTICIPANTS)
            .filter(move |q| q.for_all([q.field("email").eq(email.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(matches.into_iter().next())
    }

    /// List all participants.
    pub async fn list_participants(&self) -> Result<Vec<Participant>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::PARTICIPANTS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Fetch a batch of participants by ID, concurrently.
    ///
    /// Ids with no matching document are silently skipped.
    pub async fn find_participants_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<Participant>, AppError> {
        self.get_client()?;

        let results = stream::iter(ids.to_vec())
            .map(|id| async move { self.get_participant(&id).await })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<Option<Participant>, AppError>>>()
            .await;

        let mut participants = Vec::with_capacity(ids.len());
        for result in results {
            if let Some(participant) = result? {
                participants.push(participant);
            }
        }
        Ok(participants)
    }

    /// Create a new participant document.
    pub async fn insert_participant(&self, participant: &Participant) -> Result<(), AppError> {
        let _created: Participant = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::PARTICIPANTS)
            .document_id(&participant.participant_id)
            .object(participant)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Update a participant's profile after sign-in (field-level update).
    ///
    /// Credentials are written only when `include_tokens` is set;
    /// `created_at` is never touched.
    pub async fn update_participant_profile(
        &self,
        participant: &Participant,
        include_tokens: bool,
    ) -> Result<(), AppError> {
        let mut mask = paths!(Participant::{name, email, photo_url, gender, updated_at});
        if include_tokens {
            mask.push(path!(Participant::google_tokens));
        }

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(mask)
            .in_col(collections::PARTICIPANTS)
            .document_id(&participant.participant_id)
            .object(participant)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Persist rotated OAuth credentials (field-level update).
    pub async fn set_participant_tokens(
        &self,
        participant_id: &str,
        tokens: &GoogleTokens,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        #[derive(Serialize, Deserialize)]
        struct TokensPatch {
            google_tokens: GoogleTokens,
            updated_at: DateTime<Utc>,
        }

        let patch = TokensPatch {
            google_tokens: tokens.clone(),
            updated_at: now,
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(paths!(TokensPatch::{google_tokens, updated_at}))
            .in_col(collections::PARTICIPANTS)
            .document_id(participant_id)
            .object(&patch)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Steps Data Operations ───────────────────────────────────

    /// Get the metrics record for a participant.
    pub async fn get_steps_data(
        &self,
        participant_id: &str,
    ) -> Result<Option<StepsData>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::STEPS_DATA)
            .obj()
            .one(participant_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// List all metrics records.
    pub async fn list_steps_data(&self) -> Result<Vec<StepsData>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::STEPS_DATA)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Mark a participant's metrics record as refreshing before sync work
    /// starts, creating the record on first sync (`created_at` preserved
    /// when the record already exists).
    pub async fn mark_refreshing(
        &self,
        participant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if self.get_steps_data(participant_id).await?.is_some() {
            #[derive(Serialize, Deserialize)]
            struct RefreshingPatch {
                status: SyncStatus,
                refresh_started_at: Option<DateTime<Utc>>,
                updated_at: DateTime<Utc>,
            }

            let patch = RefreshingPatch {
                status: SyncStatus::Refreshing,
                refresh_started_at: Some(now),
                updated_at: now,
            };

            let _: () = self
                .get_client()?
                .fluent()
                .update()
                .fields(paths!(RefreshingPatch::{status, refresh_started_at, updated_at}))
                .in_col(collections::STEPS_DATA)
                .document_id(participant_id)
                .object(&patch)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        } else {
            let record = StepsData::new_refreshing(participant_id, now);
            let _created: StepsData = self
                .get_client()?
                .fluent()
                .insert()
                .into(collections::STEPS_DATA)
                .document_id(participant_id)
                .object(&record)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }
        Ok(())
    }

    /// Record a successful sync: fresh totals and breakdown, cleared error
    /// state, ready status.
    pub async fn write_sync_success(
        &self,
        participant_id: &str,
        total_steps: i64,
        daily_steps: &[DailyStepBreakdown],
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if self.get_steps_data(participant_id).await?.is_some() {
            #[derive(Serialize, Deserialize)]
            struct SuccessPatch {
                steps: i64,
                daily_steps: Vec<DailyStepBreakdown>,
                daily_steps_updated_at: Option<DateTime<Utc>>,
                status: SyncStatus,
                error_message: Option<String>,
                token_expired: bool,
                last_synced_at: Option<DateTime<Utc>>,
                updated_at: DateTime<Utc>,
            }

            let patch = SuccessPatch {
                steps: total_steps,
                daily_steps: daily_steps.to_vec(),
                daily_steps_updated_at: Some(now),
                status: SyncStatus::Ready,
                error_message: None,
                token_expired: false,
                last_synced_at: Some(now),
                updated_at: now,
            };

            let _: () = self
                .get_client()?
                .fluent()
                .update()
                .fields(paths!(SuccessPatch::{
                    steps,
                    daily_steps,
                    daily_steps_updated_at,
                    status,
                    error_message,
                    token_expired,
                    last_synced_at,
                    updated_at
                }))
                .in_col(collections::STEPS_DATA)
                .document_id(participant_id)
                .object(&patch)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        } else {
            let record = StepsData {
                participant_id: participant_id.to_string(),
                steps: total_steps,
                daily_steps: daily_steps.to_vec(),
                status: SyncStatus::Ready,
                error_message: None,
                token_expired: false,
                last_synced_at: Some(now),
                refresh_started_at: None,
                daily_steps_updated_at: Some(now),
                created_at: now,
                updated_at: now,
            };
            let _created: StepsData = self
                .get_client()?
                .fluent()
                .insert()
                .into(collections::STEPS_DATA)
                .document_id(participant_id)
                .object(&record)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }
        Ok(())
    }

    /// Record a failed sync with the failure text and re-auth hint.
    pub async fn write_sync_error(
        &self,
        participant_id: &str,
        message: &str,
        token_expired: bool,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if self.get_steps_data(participant_id).await?.is_some() {
            #[derive(Serialize, Deserialize)]
            struct ErrorPatch {
                status: SyncStatus,
                error_message: Option<String>,
                token_expired: bool,
                updated_at: DateTime<Utc>,
            }

            let patch = ErrorPatch {
                status: SyncStatus::Error,
                error_message: Some(message.to_string()),
                token_expired,
                updated_at: now,
            };

            let _: () = self
                .get_client()?
                .fluent()
                .update()
                .fields(paths!(ErrorPatch::{status, error_message, token_expired, updated_at}))
                .in_col(collections::STEPS_DATA)
                .document_id(participant_id)
                .object(&patch)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        } else {
            let record = StepsData {
                participant_id: participant_id.to_string(),
                steps: 0,
                daily_steps: Vec::new(),
                status: SyncStatus::Error,
                error_message: Some(message.to_string()),
                token_expired,
                last_synced_at: None,
                refresh_started_at: None,
                daily_steps_updated_at: None,
                created_at: now,
                updated_at: now,
            };
            let _created: StepsData = self
                .get_client()?
                .fluent()
                .insert()
                .into(collections::STEPS_DATA)
                .document_id(participant_id)
                .object(&record)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }
        Ok(())
    }

    // ─── Daily Cache Operations ──────────────────────────────────

    /// Get the cached daily breakdown for a participant.
    pub async fn get_daily_cache(
        &self,
        participant_id: &str,
    ) -> Result<Option<DailyStepsCache>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::DAILY_CACHE)
            .obj()
            .one(participant_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Replace the cached breakdown after a successful fetch.
    pub async fn set_daily_cache_success(
        &self,
        participant_id: &str,
        daily_steps: &[DailyStepBreakdown],
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let record = DailyStepsCache {
            participant_id: participant_id.to_string(),
            daily_steps: daily_steps.to_vec(),
            last_fetch_at: Some(now),
            last_success_at: Some(now),
            error_count: 0,
            last_error: None,
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::DAILY_CACHE)
            .document_id(participant_id)
            .object(&record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Record a failed fetch, preserving the previous successful payload.
    pub async fn record_daily_cache_failure(
        &self,
        participant_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        match self.get_daily_cache(participant_id).await? {
            Some(existing) => {
                #[derive(Serialize, Deserialize)]
                struct FailurePatch {
                    last_fetch_at: Option<DateTime<Utc>>,
                    error_count: u32,
                    last_error: Option<String>,
                }

                let patch = FailurePatch {
                    last_fetch_at: Some(now),
                    error_count: existing.error_count + 1,
                    last_error: Some(error.to_string()),
                };

                let _: () = self
                    .get_client()?
                    .fluent()
                    .update()
                    .fields(paths!(FailurePatch::{last_fetch_at, error_count, last_error}))
                    .in_col(collections::DAILY_CACHE)
                    .document_id(participant_id)
                    .object(&patch)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
            }
            None => {
                let record = DailyStepsCache {
                    participant_id: participant_id.to_string(),
                    daily_steps: Vec::new(),
                    last_fetch_at: Some(now),
                    last_success_at: None,
                    error_count: 1,
                    last_error: Some(error.to_string()),
                };
                let _created: DailyStepsCache = self
                    .get_client()?
                    .fluent()
                    .insert()
                    .into(collections::DAILY_CACHE)
                    .document_id(participant_id)
                    .object(&record)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
            }
        }
        Ok(())
    }
}
