//! Participant model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Participant profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Participant ID (also used as document ID)
    pub participant_id: String,
    /// Display name shown on the leaderboard
    pub name: String,
    /// Email address (lowercased, unique per participant)
    pub email: String,
    /// Profile picture URL
    pub photo_url: Option<String>,
    /// Self-reported gender, if shared
    pub gender: Option<String>,
    /// Google OAuth credentials; absent until the account is linked
    pub google_tokens: Option<GoogleTokens>,
    /// When the participant first joined
    pub created_at: DateTime<Utc>,
    /// Last profile or credential update
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    /// Leaderboard display name, falling back to email.
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            self.name.clone()
        } else if !self.email.is_empty() {
            self.email.clone()
        } else {
            "Participant".to_string()
        }
    }
}

/// Google OAuth credential set.
///
/// A sync can only proceed when `refresh_token` is present; the access
/// token alone is never trusted without checking `expiry_date`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

impl GoogleTokens {
    /// Whether a sync can even be attempted with these credentials.
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_participant(name: &str, email: &str) -> Participant {
        Participant {
            participant_id: "p1".to_string(),
            name: name.to_string(),
            email: email.to_string(),
            photo_url: None,
            gender: None,
            google_tokens: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn display_name_falls_back_to_email() {
        assert_eq!(make_participant("Asha", "a@x.test").display_name(), "Asha");
        assert_eq!(make_participant("", "a@x.test").display_name(), "a@x.test");
        assert_eq!(make_participant("", "").display_name(), "Participant");
    }

    #[test]
    fn empty_refresh_token_does_not_count() {
        let tokens = GoogleTokens {
            refresh_token: Some(String::new()),
            ..Default::default()
        };
        assert!(!tokens.has_refresh_token());
    }
}
