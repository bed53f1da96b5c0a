//! Gateway to the Spotify player endpoints.
//!
//! All remote calls the poll loop and the request handlers make go through
//! here: the currently-playing fetch, the recently-played listing, and raw
//! artwork retrieval. The currently-playing fetch classifies its own
//! failures into an explicit [`FetchError`] so the poll loop can dispatch
//! on the tag instead of unpicking status codes.

use std::time::Duration;

use reqwest::{header::RETRY_AFTER, StatusCode};
use url::Url;

use crate::{
    error::{Error, Result},
    http::Client as HttpClient,
    protocol::{
        self,
        player::{CurrentlyPlaying, RecentlyPlayed},
    },
    tokens::AccessToken,
};

/// Classified failure of a currently-playing fetch.
///
/// The poll loop's handling policy per tag:
/// * `RateLimited` - sleep the carried delay, then resume
/// * `Server`, `Malformed`, `Network` - transient, retry next tick
/// * `Client` - fatal, an unrecoverable configuration error
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// The remote asked us to back off for the carried duration.
    #[error("rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// Server-side failure (5xx).
    #[error("server-side failure: status {0}")]
    Server(StatusCode),

    /// A success response whose document is not usable.
    #[error("malformed player document: {0}")]
    Malformed(Error),

    /// The request never completed (connection, DNS, timeout).
    #[error("network failure: {0}")]
    Network(Error),

    /// Any other client-side rejection (4xx).
    #[error("client-side failure: status {0}")]
    Client(StatusCode),
}

/// HTTP access to the remote player API.
pub struct Gateway {
    http_client: HttpClient,
}

impl Gateway {
    /// The URL of the currently-playing endpoint.
    const CURRENTLY_PLAYING_URL: &'static str =
        "https://api.spotify.com/v1/me/player/currently-playing";

    /// The URL of the recently-played endpoint.
    const RECENTLY_PLAYED_URL: &'static str =
        "https://api.spotify.com/v1/me/player/recently-played";

    /// Backoff applied when a 429 carries no usable `Retry-After` header.
    const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

    #[must_use]
    pub fn new(http_client: HttpClient) -> Self {
        Self { http_client }
    }

    /// The underlying rate-limited HTTP client.
    #[must_use]
    pub fn http_client(&self) -> &HttpClient {
        &self.http_client
    }

    /// Fetches the currently playing track.
    ///
    /// Returns `Ok(None)` when the remote reports nothing playing (204).
    /// All failures come back classified; see [`FetchError`].
    pub async fn currently_playing(
        &self,
        token: &AccessToken,
    ) -> std::result::Result<Option<CurrentlyPlaying>, FetchError> {
        let request = self
            .http_client
            .unlimited
            .get(Self::CURRENTLY_PLAYING_URL)
            .bearer_auth(token.as_str())
            .build()
            .map_err(|e| FetchError::Network(e.into()))?;

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(FetchError::Network)?;

        let status = response.status();
        match status {
            StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| FetchError::Network(e.into()))?;
                let playing = protocol::json(&body, "currently-playing")
                    .map_err(FetchError::Malformed)?;
                Ok(Some(playing))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited {
                retry_after: retry_after(&response).unwrap_or(Self::DEFAULT_RETRY_AFTER),
            }),
            status if status.is_server_error() => Err(FetchError::Server(status)),
            status => Err(FetchError::Client(status)),
        }
    }

    /// Fetches the `limit` most recently played tracks.
    pub async fn recently_played(
        &self,
        token: &AccessToken,
        limit: usize,
    ) -> Result<RecentlyPlayed> {
        let request = self
            .http_client
            .unlimited
            .get(Self::RECENTLY_PLAYED_URL)
            .bearer_auth(token.as_str())
            .query(&[("limit", limit)])
            .build()?;

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::unavailable(format!(
                "recently-played fetch failed with status {status}"
            )));
        }

        let body = response.text().await?;
        protocol::json(&body, "recently-played")
    }

    /// Fetches raw artwork bytes from an arbitrary URL.
    pub async fn artwork(&self, url: &Url) -> Result<Vec<u8>> {
        let request = self
            .http_client
            .unlimited
            .get(url.clone())
            .build()?;

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::unavailable(format!(
                "artwork fetch failed with status {status}"
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Parses the `Retry-After` header as a seconds count.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
}
