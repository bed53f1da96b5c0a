//! Track snapshots and the now-playing payload.
//!
//! A [`TrackSnapshot`] is the immutable projection of one currently-playing
//! response: just the fields clients render, plus the artwork URL the theme
//! is derived from. [`NowPlaying`] pairs a snapshot with its derived theme
//! and is the single document served to query consumers and pushed to
//! websocket subscribers. The two always change together.

use serde::Serialize;
use url::Url;

use crate::{protocol::player, theme::Theme};

/// Immutable view of one playing track.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TrackSnapshot {
    /// Remote track id; the deduplication key for change detection.
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album: String,
    pub track_href: Url,
    pub album_href: Url,
    pub artist_href: Url,
    pub artwork_href: Url,
}

impl TrackSnapshot {
    /// Builds a snapshot from a track document.
    ///
    /// Returns `None` when the document lacks an artist or artwork entry.
    /// The remote API always includes both for ordinary tracks, so an
    /// absence means the document is not usable this tick.
    #[must_use]
    pub fn from_track(track: &player::Track) -> Option<Self> {
        let artist = track.artists.first()?;
        // Renditions are ordered widest first.
        let artwork = track.album.images.first()?;

        Some(Self {
            id: track.id.clone(),
            name: track.name.clone(),
            artist: artist.name.clone(),
            album: track.album.name.clone(),
            track_href: track.external_urls.spotify.clone(),
            album_href: track.album.external_urls.spotify.clone(),
            artist_href: artist.external_urls.spotify.clone(),
            artwork_href: artwork.url.clone(),
        })
    }
}

/// The authoritative "what is playing right now" document.
///
/// Owned by the poll loop and replaced atomically on each accepted track
/// transition; `None` at the state level means nothing is playing.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct NowPlaying {
    #[serde(flatten)]
    pub track: TrackSnapshot,
    pub theme: Theme,
}
