//! The currently-playing poll loop.
//!
//! One long-running task ticks on a fixed cadence, fetches the player
//! state, deduplicates on track identity, and on each accepted transition
//! derives the artwork theme, replaces the authoritative snapshot, and
//! publishes exactly one broadcast frame. Failure policy per tick:
//!
//! * authentication, server-side (5xx), malformed-document, and network
//!   failures are transient: logged, no state change, resume next tick
//! * a rate limit sleeps the server-specified delay out of band
//! * artwork or theme failures abandon the tick without advancing the held
//!   identity, so the next tick retries the same transition
//! * any other client-side failure is fatal and terminates the task
//!
//! The broadcast count over a run therefore equals the number of accepted
//! identity transitions.

use std::{ops::ControlFlow, sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    broadcast::Broadcaster,
    gateway::{FetchError, Gateway},
    protocol::player::{CurrentlyPlaying, Track},
    theme,
    tokens::{TokenCache, TokenError},
    track::{NowPlaying, TrackSnapshot},
};

/// The authoritative now-playing state, shared with request handlers.
///
/// Written only by the poll loop; snapshot and theme are replaced together
/// in one write.
pub type SharedNowPlaying = Arc<RwLock<Option<NowPlaying>>>;

/// Failure to obtain a player document this tick.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The bearer token could not be refreshed.
    #[error("authentication failed: {0}")]
    Auth(#[from] TokenError),

    /// The fetch itself failed; see [`FetchError`] for the classification.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Terminal failure of the poll task.
///
/// Only unrecoverable client-side API rejections terminate the loop; the
/// supervisor surfaces this to the operator.
#[derive(Error, Debug)]
#[error("unrecoverable player API failure: {0}")]
pub struct FatalError(#[from] pub FetchError);

/// Where the poll loop gets player documents and artwork from.
///
/// The production implementation is [`SpotifySource`]; tests substitute a
/// scripted one.
#[async_trait]
pub trait PlayerSource: Send + Sync {
    /// Fetches the current player document, `None` when nothing plays.
    async fn currently_playing(&self) -> Result<Option<CurrentlyPlaying>, SourceError>;

    /// Fetches raw artwork bytes.
    async fn artwork(&self, url: &Url) -> crate::error::Result<Vec<u8>>;
}

/// Token-authenticated gateway access.
pub struct SpotifySource {
    gateway: Arc<Gateway>,
    tokens: Arc<TokenCache>,
}

impl SpotifySource {
    #[must_use]
    pub fn new(gateway: Arc<Gateway>, tokens: Arc<TokenCache>) -> Self {
        Self { gateway, tokens }
    }
}

#[async_trait]
impl PlayerSource for SpotifySource {
    async fn currently_playing(&self) -> Result<Option<CurrentlyPlaying>, SourceError> {
        let token = self.tokens.get(self.gateway.http_client()).await?;
        Ok(self.gateway.currently_playing(&token).await?)
    }

    async fn artwork(&self, url: &Url) -> crate::error::Result<Vec<u8>> {
        self.gateway.artwork(url).await
    }
}

/// The poll state machine.
pub struct PollLoop<S> {
    source: S,
    broadcaster: Arc<Broadcaster>,
    state: SharedNowPlaying,
    interval: Duration,
    palette_size: usize,

    /// Identity of the track the authoritative state was built from;
    /// `None` means nothing playing. The deduplication key.
    current_identity: Option<String>,
}

impl<S> PollLoop<S>
where
    S: PlayerSource,
{
    #[must_use]
    pub fn new(
        source: S,
        broadcaster: Arc<Broadcaster>,
        state: SharedNowPlaying,
        interval: Duration,
        palette_size: usize,
    ) -> Self {
        Self {
            source,
            broadcaster,
            state,
            interval,
            palette_size,
            current_identity: None,
        }
    }

    /// Runs until cancelled or a fatal API failure occurs.
    ///
    /// Cancellation aborts any in-flight network call or backoff sleep.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), FatalError> {
        info!("starting now-playing poll task");
        tokio::select! {
            () = cancel.cancelled() => {
                info!("poll task cancelled");
                Ok(())
            }
            result = self.drive() => result,
        }
    }

    async fn drive(&mut self) -> Result<(), FatalError> {
        loop {
            tokio::time::sleep(self.interval).await;
            if let ControlFlow::Break(e) = self.tick().await {
                return Err(e);
            }
        }
    }

    /// One poll tick. `Break` carries the fatal error that must stop the
    /// loop; every other outcome continues on the next tick.
    async fn tick(&mut self) -> ControlFlow<FatalError> {
        let playing = match self.source.currently_playing().await {
            Ok(playing) => playing,
            Err(SourceError::Auth(e)) => {
                warn!("unable to refresh access token: {e}");
                return ControlFlow::Continue(());
            }
            Err(SourceError::Fetch(e)) => return self.handle_fetch_error(e).await,
        };

        // A 200 whose track section is missing is not usable; observed
        // from the remote during track transitions.
        let identity = match &playing {
            Some(playing) => match &playing.item {
                Some(track) => Some(track.id.clone()),
                None => {
                    debug!("player document without track section, skipping tick");
                    return ControlFlow::Continue(());
                }
            },
            None => None,
        };

        if identity == self.current_identity {
            return ControlFlow::Continue(());
        }

        let next = match playing.as_ref().and_then(|playing| playing.item.as_ref()) {
            Some(track) => match self.resolve(track).await {
                Some(now_playing) => Some(now_playing),
                // Abandoned tick: identity not advanced, retried next tick.
                None => return ControlFlow::Continue(()),
            },
            None => None,
        };

        match &next {
            Some(now_playing) => {
                info!(
                    "now playing: {} - {}",
                    now_playing.track.artist, now_playing.track.name
                );
            }
            None => info!("nothing playing"),
        }

        *self.state.write().await = next.clone();
        self.current_identity = identity;
        self.broadcaster.publish(next.as_ref()).await;

        ControlFlow::Continue(())
    }

    /// Builds the snapshot and theme for a changed track.
    ///
    /// Any failure here logs and returns `None` so the tick is abandoned
    /// as a whole.
    async fn resolve(&self, track: &Track) -> Option<NowPlaying> {
        let Some(snapshot) = TrackSnapshot::from_track(track) else {
            warn!("player document missing artist or artwork, skipping tick");
            return None;
        };

        let artwork = match self.source.artwork(&snapshot.artwork_href).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("unable to fetch artwork: {e}");
                return None;
            }
        };

        let theme = match theme::extract(&artwork, self.palette_size) {
            Ok(theme) => theme,
            Err(e) => {
                warn!("unable to derive theme: {e}");
                return None;
            }
        };

        Some(NowPlaying {
            track: snapshot,
            theme,
        })
    }

    /// Dispatches on the fetch classification.
    async fn handle_fetch_error(&self, error: FetchError) -> ControlFlow<FatalError> {
        match error {
            FetchError::RateLimited { retry_after } => {
                warn!(
                    "rate limited by remote API, backing off {}s",
                    retry_after.as_secs()
                );
                // Out-of-band sleep; only the poll task waits.
                tokio::time::sleep(retry_after).await;
                ControlFlow::Continue(())
            }
            FetchError::Server(_) | FetchError::Malformed(_) | FetchError::Network(_) => {
                warn!("unable to fetch currently playing: {error}");
                ControlFlow::Continue(())
            }
            FetchError::Client(_) => ControlFlow::Break(FatalError(error)),
        }
    }
}
