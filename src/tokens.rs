//! Bearer token cache for the Spotify Web API.
//!
//! The daemon authenticates with a short-lived bearer token obtained by
//! exchanging a long-lived refresh token. [`TokenCache`] owns that bearer
//! credential: callers ask it for a token and it refreshes transparently
//! when the cached one is absent or near expiry. A failed refresh leaves
//! the previous token untouched, but callers must not assume a stale token
//! is still usable; the poll loop simply retries on its next tick.

use std::{
    fmt,
    time::{Duration, SystemTime},
};

use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Mutex;
use veil::Redact;

use crate::{
    config::Credentials,
    http::Client as HttpClient,
    protocol::{self, auth::TokenResponse},
};

/// A bearer token together with its expiry.
///
/// Replaced wholesale on refresh, never mutated in place. The expiry
/// already carries the safety margin, so a token is usable exactly while
/// `is_expired` returns false.
#[derive(Clone, Redact, PartialEq, Eq)]
pub struct AccessToken {
    #[redact(fixed = 3)]
    value: String,
    expires_at: SystemTime,
}

/// Errors from the credential exchange.
#[derive(Error, Debug)]
pub enum TokenError {
    /// The token endpoint answered with a non-success status. The refresh
    /// token or client credentials are likely invalid.
    #[error("token exchange refused with status {0}")]
    Refused(StatusCode),

    /// The exchange could not be carried out or its response could not be
    /// parsed.
    #[error("token endpoint error: {0}")]
    Provider(#[from] crate::error::Error),
}

impl AccessToken {
    /// Safety margin subtracted from the reported lifetime, so the token is
    /// never presented to the remote API with only seconds on the clock.
    const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

    /// Creates a token from an exchange response received at `issued_at`.
    #[must_use]
    pub fn new(response: &TokenResponse, issued_at: SystemTime) -> Self {
        let lifetime = response
            .expires_in
            .checked_sub(Self::EXPIRY_MARGIN)
            .unwrap_or(Duration::ZERO);

        Self {
            value: response.access_token.clone(),
            expires_at: issued_at + lifetime,
        }
    }

    /// The token value to present as `Bearer` authorization.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// When the token stops being usable, margin included.
    #[must_use]
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    #[must_use]
    pub fn time_to_live(&self) -> Duration {
        self.expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Owns the cached bearer token and the refresh credential.
///
/// Mutation is serialized through an internal lock so the poll loop and the
/// request handlers can share one cache.
pub struct TokenCache {
    credentials: Credentials,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    /// The URL of the token endpoint.
    const TOKEN_URL: &'static str = "https://accounts.spotify.com/api/token";

    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Returns a usable bearer token, refreshing it first if the cached one
    /// is absent or expired.
    ///
    /// No internal retry: a refresh failure surfaces immediately and the
    /// caller decides when to try again.
    pub async fn get(&self, http_client: &HttpClient) -> Result<AccessToken, TokenError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.clone());
            }
        }

        let token = self.refresh(http_client).await?;
        debug!(
            "acquired access token, valid for {}s",
            token.time_to_live().as_secs()
        );
        *cached = Some(token.clone());

        Ok(token)
    }

    /// Performs the credential exchange.
    ///
    /// Does not touch the cache; the caller stores the result, so a failure
    /// here leaves any previous token in place.
    async fn refresh(&self, http_client: &HttpClient) -> Result<AccessToken, TokenError> {
        let issued_at = SystemTime::now();

        let request = http_client
            .unlimited
            .post(Self::TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.credentials.refresh_token.as_str()),
            ])
            .build()
            .map_err(crate::error::Error::from)?;

        let response = http_client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TokenError::Refused(status));
        }

        let body = response
            .text()
            .await
            .map_err(crate::error::Error::from)?;
        let response: TokenResponse = protocol::json(&body, "token")?;

        Ok(AccessToken::new(&response, issued_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn response(expires_in: Duration) -> TokenResponse {
        TokenResponse {
            access_token: "token".to_owned(),
            expires_in,
            scope: None,
        }
    }

    fn credentials() -> Credentials {
        Credentials {
            client_id: "id".to_owned(),
            client_secret: "secret".to_owned(),
            refresh_token: "refresh".to_owned(),
        }
    }

    fn http_client() -> HttpClient {
        HttpClient::new(&Config::with_credentials(credentials())).expect("http client")
    }

    #[test]
    fn expiry_carries_margin() {
        let issued_at = SystemTime::now();
        let token = AccessToken::new(&response(Duration::from_secs(3600)), issued_at);
        assert_eq!(
            token.expires_at(),
            issued_at + Duration::from_secs(3600 - 30)
        );
        assert!(!token.is_expired());
    }

    #[test]
    fn short_lifetime_expires_immediately() {
        let token = AccessToken::new(&response(Duration::from_secs(10)), SystemTime::now());
        assert!(token.is_expired());
        assert_eq!(token.time_to_live(), Duration::ZERO);
    }

    #[tokio::test]
    async fn cache_starts_empty() {
        let cache = TokenCache::new(credentials());
        assert!(cache.cached.lock().await.is_none());
    }

    /// The test credentials cannot complete an exchange, so a successful
    /// `get` proves the cached token was handed back without a refresh.
    #[tokio::test]
    async fn unexpired_token_is_served_from_cache() {
        let cache = TokenCache::new(credentials());
        let seeded = AccessToken::new(&response(Duration::from_secs(3600)), SystemTime::now());
        *cache.cached.lock().await = Some(seeded.clone());

        let token = cache.get(&http_client()).await.expect("cached token");
        assert_eq!(token, seeded);
    }

    #[tokio::test]
    async fn expired_token_triggers_a_refresh_attempt() {
        let cache = TokenCache::new(credentials());
        let seeded = AccessToken::new(&response(Duration::from_secs(10)), SystemTime::now());
        assert!(seeded.is_expired());
        *cache.cached.lock().await = Some(seeded.clone());

        // The attempted exchange fails with these credentials; the expired
        // token must not be handed back, and must survive the failure.
        let result = cache.get(&http_client()).await;
        assert!(result.is_err());
        assert_eq!(*cache.cached.lock().await, Some(seeded));
    }
}
