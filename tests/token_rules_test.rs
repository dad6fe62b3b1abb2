// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token manager contract: no network traffic unless a refresh is due.

use chrono::{Duration, Utc};
use step_rally::models::GoogleTokens;
use step_rally::services::google_fit::{needs_refresh, FitError, GoogleFitClient};

fn client() -> GoogleFitClient {
    GoogleFitClient::new("client_id".to_string(), "client_secret".to_string())
}

#[tokio::test]
async fn missing_refresh_token_fails_without_network() {
    let tokens = GoogleTokens {
        access_token: Some("access".to_string()),
        refresh_token: None,
        expiry_date: Some(Utc::now() + Duration::hours(1)),
        ..Default::default()
    };

    let err = client()
        .ensure_access_token(&tokens)
        .await
        .expect_err("must fail with no refresh token");
    assert!(matches!(err, FitError::MissingRefreshToken));
    assert!(err.is_token_expired());
}

#[tokio::test]
async fn valid_token_is_returned_unchanged() {
    let tokens = GoogleTokens {
        access_token: Some("access".to_string()),
        refresh_token: Some("refresh".to_string()),
        expiry_date: Some(Utc::now() + Duration::hours(1)),
        scope: Some("fitness.activity.read".to_string()),
        token_type: Some("Bearer".to_string()),
    };

    // Expiry is far out, so no token-endpoint call happens; a network
    // attempt would fail the test as the test credentials are fake.
    let ensured = client()
        .ensure_access_token(&tokens)
        .await
        .expect("valid token should pass through");

    assert_eq!(ensured.access_token, "access");
    assert!(!ensured.refreshed);
    assert_eq!(ensured.tokens.refresh_token.as_deref(), Some("refresh"));
    assert_eq!(ensured.tokens.scope.as_deref(), Some("fitness.activity.read"));
}

#[test]
fn refresh_boundary_sits_at_the_60s_margin() {
    let now = Utc::now();
    let base = GoogleTokens {
        access_token: Some("access".to_string()),
        refresh_token: Some("refresh".to_string()),
        ..Default::default()
    };

    let fresh = GoogleTokens {
        expiry_date: Some(now + Duration::seconds(61)),
        ..base.clone()
    };
    assert!(!needs_refresh(&fresh, now));

    let expiring = GoogleTokens {
        expiry_date: Some(now + Duration::seconds(59)),
        ..base.clone()
    };
    assert!(needs_refresh(&expiring, now));

    let no_expiry = GoogleTokens {
        expiry_date: None,
        ..base
    };
    assert!(needs_refresh(&no_expiry, now));
}
