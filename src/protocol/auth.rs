//! Token endpoint response types.
//!
//! The credential exchange posts a refresh token and receives a short-lived
//! bearer token:
//!
//! ```json
//! {
//!     "access_token": "secret_token",
//!     "token_type": "Bearer",
//!     "expires_in": 3600,
//!     "scope": "user-read-currently-playing user-read-recently-played"
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;
use veil::Redact;

/// Successful credential exchange response.
#[derive(Clone, Eq, PartialEq, Deserialize, Redact, Hash)]
pub struct TokenResponse {
    /// Bearer token for API authentication.
    #[redact]
    pub access_token: String,

    /// How long the token remains valid from the moment of issue.
    #[serde(with = "seconds")]
    pub expires_in: Duration,

    /// Space-separated scopes granted to the token, if reported.
    #[serde(default)]
    pub scope: Option<String>,
}

/// (De)serializes a `Duration` from a plain seconds integer.
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_response() {
        let body = r#"{
            "access_token": "abc123",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "user-read-currently-playing"
        }"#;

        let response: TokenResponse = serde_json::from_str(body).expect("valid document");
        assert_eq!(response.access_token, "abc123");
        assert_eq!(response.expires_in, Duration::from_secs(3600));
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let response = TokenResponse {
            access_token: "very-secret".to_owned(),
            expires_in: Duration::from_secs(60),
            scope: None,
        };
        assert!(!format!("{response:?}").contains("very-secret"));
    }
}
