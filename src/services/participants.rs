// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Participant sign-in handling: profile upsert and credential merge.

use crate::db::StepsDb;
use crate::error::{AppError, Result};
use crate::models::{GoogleTokens, Participant};
use crate::services::sync::SyncService;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Incoming sign-in payload from the auth frontend.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email)]
    pub email: String,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub gender: Option<String>,
    #[serde(default)]
    pub tokens: Option<SignInTokens>,
}

/// OAuth credential fields as delivered by the provider callback.
#[derive(Debug, Clone, Deserialize)]
pub struct SignInTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Expiry as epoch seconds
    pub expires_at: Option<i64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

/// Outcome of a sign-in upsert.
#[derive(Debug, Clone, Serialize)]
pub struct JoinOutcome {
    pub participant_id: String,
    pub created: bool,
    /// True when a sync ran inline before this response
    pub synced_immediately: bool,
}

/// Merge freshly granted credentials over the stored set; incoming
/// values win field by field.
fn merge_tokens(
    existing: Option<&GoogleTokens>,
    incoming: Option<&SignInTokens>,
) -> GoogleTokens {
    let existing = existing.cloned().unwrap_or_default();
    let Some(incoming) = incoming else {
        return existing;
    };

    GoogleTokens {
        access_token: incoming.access_token.clone().or(existing.access_token),
        refresh_token: incoming.refresh_token.clone().or(existing.refresh_token),
        expiry_date: incoming
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or(existing.expiry_date),
        scope: incoming.scope.clone().or(existing.scope),
        token_type: incoming.token_type.clone().or(existing.token_type),
    }
}

/// Create or update a participant on sign-in.
///
/// A participant whose refresh token was just linked is synced before
/// returning; anyone already linked is queued for a background sync.
pub async fn upsert_participant(
    db: &StepsDb,
    sync: &SyncService,
    request: SignInRequest,
) -> Result<JoinOutcome> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let email = request.email.to_lowercase();
    let existing = db.find_participant_by_email(&email).await?;
    let now = Utc::now();

    let previously_linked = existing
        .as_ref()
        .and_then(|p| p.google_tokens.as_ref())
        .is_some_and(GoogleTokens::has_refresh_token);

    let merged = merge_tokens(
        existing.as_ref().and_then(|p| p.google_tokens.as_ref()),
        request.tokens.as_ref(),
    );
    let linked = merged.has_refresh_token();

    let (participant_id, created) = match existing {
        Some(mut participant) => {
            if let Some(name) = request.name {
                participant.name = name;
            }
            if participant.name.is_empty() {
                participant.name = email.clone();
            }
            participant.photo_url = request.photo_url.or(participant.photo_url);
            participant.gender = request.gender.or(participant.gender);
            if linked {
                participant.google_tokens = Some(merged.clone());
            }
            participant.updated_at = now;

            db.update_participant_profile(&participant, linked).await?;
            (participant.participant_id, false)
        }
        None => {
            let participant = Participant {
                participant_id: uuid::Uuid::new_v4().to_string(),
                name: request.name.unwrap_or_else(|| email.clone()),
                email: email.clone(),
                photo_url: request.photo_url,
                gender: request.gender,
                google_tokens: linked.then(|| merged.clone()),
                created_at: now,
                updated_at: now,
            };

            db.insert_participant(&participant).await?;
            (participant.participant_id, true)
        }
    };

    let mut synced_immediately = false;
    if linked {
        let ids = vec![participant_id.clone()];
        if previously_linked {
            sync.queue_participant_sync(&ids);
        } else {
            // First link: sync before the response so the leaderboard has
            // real numbers on the participant's first page view.
            sync.refresh_participants_by_ids(&ids).await?;
            synced_immediately = true;
        }
    }

    tracing::info!(
        participant_id = %participant_id,
        created,
        linked,
        "Participant sign-in processed"
    );

    Ok(JoinOutcome {
        participant_id,
        created,
        synced_immediately,
    })
}
