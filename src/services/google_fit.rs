// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Fit API client: OAuth token refresh and step aggregation.
//!
//! Handles:
//! - Access-token validity checks with a safety margin
//! - Refresh-token grants against Google's token endpoint
//! - Step data source resolution (excluding manual entry)
//! - Day-bucketed aggregation over the challenge window

use crate::challenge::challenge_window_millis;
use crate::models::{DailyStepBreakdown, GoogleTokens};
use crate::time_utils::format_challenge_date;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const AGGREGATE_ENDPOINT: &str =
    "https://www.googleapis.com/fitness/v1/users/me/dataset:aggregate";
const DATA_SOURCES_ENDPOINT: &str =
    "https://www.googleapis.com/fitness/v1/users/me/dataSources";

/// Margin before token expiration when we proactively refresh.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Day-sized aggregation buckets.
const DAY_IN_MILLIS: i64 = 24 * 60 * 60 * 1000;

const STEP_DELTA_STREAM: &str = "com.google.step_count.delta";
const MANUAL_ENTRY_MARKER: &str = "user_input";
const ESTIMATED_STEPS_MARKER: &str = "estimated_steps";

/// Structured failure taxonomy for token and Fit API calls.
///
/// The sync coordinator branches on these variants (never on message
/// text) when deciding how a failure is recorded.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FitError {
    #[error("Participant has no Google refresh token on file; reconnect account")]
    MissingRefreshToken,

    #[error("Failed to refresh Google token: HTTP {status}: {body}")]
    TokenRefreshRejected { status: u16, body: String },

    #[error("No valid step sources found (excluding user_input)")]
    NoStepSources,

    #[error("Google Fit API error: HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Google Fit request failed: {0}")]
    Network(String),

    #[error("Unexpected Google Fit response: {0}")]
    Malformed(String),
}

impl FitError {
    /// Whether this failure means the participant must re-authenticate.
    pub fn is_token_expired(&self) -> bool {
        match self {
            FitError::MissingRefreshToken | FitError::TokenRefreshRejected { .. } => true,
            FitError::Upstream { status, .. } => *status == 401,
            _ => false,
        }
    }
}

/// Result of ensuring a usable access token.
#[derive(Debug, Clone)]
pub struct EnsuredToken {
    pub access_token: String,
    /// True when a refresh-token grant was performed
    pub refreshed: bool,
    /// Credential set to persist back onto the participant
    pub tokens: GoogleTokens,
}

/// Per-day step summary over the challenge window.
#[derive(Debug, Clone, Default)]
pub struct ChallengeStepSummary {
    pub total_steps: i64,
    pub daily_steps: Vec<DailyStepBreakdown>,
}

/// Whether the stored access token must be refreshed before use.
///
/// A token is trusted only when present and expiring more than the safety
/// margin in the future.
pub fn needs_refresh(tokens: &GoogleTokens, now: DateTime<Utc>) -> bool {
    match (&tokens.access_token, tokens.expiry_date) {
        (Some(_), Some(expiry)) => expiry - now < Duration::seconds(TOKEN_REFRESH_MARGIN_SECS),
        _ => true,
    }
}

/// Google Fit API client with OAuth client credentials.
#[derive(Clone)]
pub struct GoogleFitClient {
    http: reqwest::Client,
    token_url: String,
    aggregate_url: String,
    data_sources_url: String,
    client_id: String,
    client_secret: String,
}

impl GoogleFitClient {
    /// Create a new client with OAuth client credentials.
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: TOKEN_ENDPOINT.to_string(),
            aggregate_url: AGGREGATE_ENDPOINT.to_string(),
            data_sources_url: DATA_SOURCES_ENDPOINT.to_string(),
            client_id,
            client_secret,
        }
    }

    // ─── Token Management ────────────────────────────────────────

    /// Return a usable access token, refreshing via Google when the
    /// stored one is absent or expiring within the safety margin.
    ///
    /// Fails without any network call when no refresh token is on file.
    pub async fn ensure_access_token(
        &self,
        tokens: &GoogleTokens,
    ) -> Result<EnsuredToken, FitError> {
        if !tokens.has_refresh_token() {
            return Err(FitError::MissingRefreshToken);
        }

        let now = Utc::now();
        if let Some(access_token) = tokens.access_token.as_deref() {
            if !needs_refresh(tokens, now) {
                return Ok(EnsuredToken {
                    access_token: access_token.to_string(),
                    refreshed: false,
                    tokens: tokens.clone(),
                });
            }
        }

        let refresh_token = tokens
            .refresh_token
            .clone()
            .ok_or(FitError::MissingRefreshToken)?;

        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| FitError::Network(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FitError::TokenRefreshRejected { status, body });
        }

        let payload: TokenRefreshResponse = response
            .json()
            .await
            .map_err(|e| FitError::Malformed(format!("token response: {}", e)))?;

        let expiry = now + Duration::seconds(payload.expires_in);
        let updated = GoogleTokens {
            access_token: Some(payload.access_token.clone()),
            // Google does not rotate the refresh token on this grant
            refresh_token: Some(refresh_token),
            expiry_date: Some(expiry),
            scope: payload.scope.or_else(|| tokens.scope.clone()),
            token_type: payload.token_type.or_else(|| tokens.token_type.clone()),
        };

        tracing::debug!("Google access token refreshed");

        Ok(EnsuredToken {
            access_token: payload.access_token,
            refreshed: true,
            tokens: updated,
        })
    }

    // ─── Step Aggregation ────────────────────────────────────────

    /// Fetch the per-day step summary for the challenge window.
    ///
    /// Days with zero measured steps are absent from the result; a phone
    /// that was off is not the same as a measured zero.
    pub async fn fetch_challenge_step_summary(
        &self,
        access_token: &str,
    ) -> Result<ChallengeStepSummary, FitError> {
        let buckets = self.fetch_step_buckets(access_token, DAY_IN_MILLIS).await?;
        Ok(summarize_buckets(buckets))
    }

    async fn fetch_step_buckets(
        &self,
        access_token: &str,
        bucket_duration_millis: i64,
    ) -> Result<Vec<StepBucket>, FitError> {
        let sources = self.resolve_aggregate_sources(access_token).await?;
        let aggregate_by: Vec<serde_json::Value> = sources
            .iter()
            .map(|id| serde_json::json!({ "dataSourceId": id }))
            .collect();

        let (start_millis, end_millis) = challenge_window_millis();
        let payload = serde_json::json!({
            "aggregateBy": aggregate_by,
            "bucketByTime": { "durationMillis": bucket_duration_millis },
            "startTimeMillis": start_millis,
            "endTimeMillis": end_millis,
        });

        let response = self
            .http
            .post(&self.aggregate_url)
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| FitError::Network(format!("Aggregate request failed: {}", e)))?;

        let data: AggregateResponse = check_response_json(response).await?;

        Ok(data.bucket.iter().filter_map(parse_bucket).collect())
    }

    /// Resolve which data streams to aggregate.
    ///
    /// Manual ("user input") streams are excluded outright; when Google's
    /// derived estimated-steps stream is present it is the single source
    /// of truth, otherwise all remaining step-delta streams count.
    async fn resolve_aggregate_sources(
        &self,
        access_token: &str,
    ) -> Result<Vec<String>, FitError> {
        let response = self
            .http
            .get(&self.data_sources_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| FitError::Network(format!("Data sources request failed: {}", e)))?;

        let listing: DataSourceListing = check_response_json(response).await?;

        let step_sources: Vec<String> = listing
            .data_source
            .into_iter()
            .filter_map(|src| src.data_stream_id)
            .filter(|id| id.contains(STEP_DELTA_STREAM) && !id.contains(MANUAL_ENTRY_MARKER))
            .collect();

        if step_sources.is_empty() {
            return Err(FitError::NoStepSources);
        }

        Ok(select_aggregate_sources(step_sources))
    }
}

/// Prefer the estimated-steps stream exclusively when present.
fn select_aggregate_sources(step_sources: Vec<String>) -> Vec<String> {
    if let Some(estimated) = step_sources
        .iter()
        .find(|id| id.contains(ESTIMATED_STEPS_MARKER))
    {
        return vec![estimated.clone()];
    }
    step_sources
}

/// Collapse parsed buckets into the challenge summary, dropping days with
/// no measured steps.
fn summarize_buckets(buckets: Vec<StepBucket>) -> ChallengeStepSummary {
    let mut daily_steps = Vec::new();
    let mut total_steps = 0i64;

    for bucket in buckets.into_iter().filter(|b| b.steps > 0) {
        total_steps += bucket.steps;
        daily_steps.push(DailyStepBreakdown {
            date: format_challenge_date(bucket.start_time_millis),
            steps: bucket.steps,
            start_time_millis: bucket.start_time_millis,
            end_time_millis: bucket.end_time_millis,
            source: bucket.origin_data_source_id,
        });
    }

    ChallengeStepSummary {
        total_steps,
        daily_steps,
    }
}

/// Parse one raw aggregation bucket; `None` when the window is unusable.
///
/// Points whose origin looks like manual entry contribute nothing. The
/// bucket's source is the first non-manual origin with a positive value.
fn parse_bucket(raw: &RawBucket) -> Option<StepBucket> {
    let start = raw.start_time_millis.as_deref()?.parse::<i64>().ok()?;
    let end = raw.end_time_millis.as_deref()?.parse::<i64>().ok()?;

    let mut steps = 0i64;
    let mut origin: Option<String> = None;

    for point in raw.dataset.iter().flat_map(|d| d.point.iter()) {
        let origin_id = point
            .origin_data_source_id
            .as_deref()
            .or(point.data_source_id.as_deref())
            .or(point.data_origin.as_deref());

        if origin_id.is_some_and(|id| id.contains(MANUAL_ENTRY_MARKER)) {
            continue;
        }

        let int_val = match point.value.first() {
            Some(RawValue {
                int_val: Some(v), ..
            }) => *v,
            Some(RawValue {
                fp_val: Some(v), ..
            }) => v.round() as i64,
            _ => 0,
        };

        if int_val > 0 && origin.is_none() {
            if let Some(id) = origin_id {
                origin = Some(id.to_string());
            }
        }

        steps += int_val;
    }

    Some(StepBucket {
        start_time_millis: start,
        end_time_millis: end,
        steps,
        origin_data_source_id: origin,
    })
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, FitError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if status == 401 {
            tracing::warn!("Google Fit rejected access token (401)");
        }

        return Err(FitError::Upstream { status, body });
    }

    response
        .json()
        .await
        .map_err(|e| FitError::Malformed(format!("JSON parse error: {}", e)))
}

/// One parsed aggregation bucket (pre-filtering).
#[derive(Debug, Clone)]
struct StepBucket {
    start_time_millis: i64,
    end_time_millis: i64,
    steps: i64,
    origin_data_source_id: Option<String>,
}

/// Token refresh response from Google OAuth.
#[derive(Debug, Clone, Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    expires_in: i64,
    token_type: Option<String>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DataSourceListing {
    #[serde(default, rename = "dataSource")]
    data_source: Vec<DataSourceEntry>,
}

#[derive(Debug, Deserialize)]
struct DataSourceEntry {
    #[serde(rename = "dataStreamId")]
    data_stream_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    bucket: Vec<RawBucket>,
}

#[derive(Debug, Deserialize)]
struct RawBucket {
    #[serde(rename = "startTimeMillis")]
    start_time_millis: Option<String>,
    #[serde(rename = "endTimeMillis")]
    end_time_millis: Option<String>,
    #[serde(default)]
    dataset: Vec<RawDataset>,
}

#[derive(Debug, Deserialize)]
struct RawDataset {
    #[serde(default)]
    point: Vec<RawPoint>,
}

#[derive(Debug, Deserialize)]
struct RawPoint {
    #[serde(rename = "originDataSourceId")]
    origin_data_source_id: Option<String>,
    #[serde(rename = "dataSourceId")]
    data_source_id: Option<String>,
    #[serde(rename = "dataOrigin")]
    data_origin: Option<String>,
    #[serde(default)]
    value: Vec<RawValue>,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    #[serde(rename = "intVal")]
    int_val: Option<i64>,
    #[serde(rename = "fpVal")]
    fp_val: Option<f64>,
}
