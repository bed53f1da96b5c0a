//! Player endpoint documents: currently-playing and recently-played.
//!
//! Only the fields the daemon consumes are modeled; the remote documents
//! carry much more. The currently-playing endpoint answers 204 with no body
//! when nothing is playing, and may also answer 200 with a document whose
//! `item` is `null` (observed during track transitions and for some
//! non-track content).
//!
//! # Wire Format
//!
//! Currently-playing response (abridged):
//! ```json
//! {
//!     "item": {
//!         "id": "11dFghVXANMlKmJXsNCbNl",
//!         "name": "Cut To The Feeling",
//!         "artists": [ { "name": "Carly Rae Jepsen", "external_urls": { "spotify": "https://..." } } ],
//!         "album": {
//!             "name": "Cut To The Feeling",
//!             "external_urls": { "spotify": "https://..." },
//!             "images": [ { "url": "https://i.scdn.co/image/...", "width": 640, "height": 640 } ]
//!         },
//!         "external_urls": { "spotify": "https://..." }
//!     }
//! }
//! ```

use serde::Deserialize;
use url::Url;

/// Document returned by the currently-playing endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct CurrentlyPlaying {
    /// The playing track. `None` despite a 200 response means the document
    /// is not usable this tick.
    #[serde(default)]
    pub item: Option<Track>,
}

/// A track document as embedded in player responses.
#[derive(Clone, Debug, Deserialize)]
pub struct Track {
    /// Base-62 track id, the deduplication key.
    pub id: String,
    pub name: String,
    pub artists: Vec<Artist>,
    pub album: Album,
    pub external_urls: ExternalUrls,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Artist {
    pub name: String,
    pub external_urls: ExternalUrls,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Album {
    pub name: String,
    pub external_urls: ExternalUrls,

    /// Artwork renditions, widest first.
    #[serde(default)]
    pub images: Vec<Image>,
}

/// One artwork rendition.
#[derive(Clone, Debug, Deserialize)]
pub struct Image {
    pub url: Url,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// Link collection; only the public web link is consumed.
#[derive(Clone, Debug, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Url,
}

/// Page returned by the recently-played endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct RecentlyPlayed {
    pub items: Vec<PlayHistory>,
}

/// One entry of the recently-played page.
#[derive(Clone, Debug, Deserialize)]
pub struct PlayHistory {
    pub track: Track,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYING: &str = r#"{
        "context": { "external_urls": { "spotify": "https://open.spotify.com/playlist/1" } },
        "item": {
            "id": "11dFghVXANMlKmJXsNCbNl",
            "name": "Cut To The Feeling",
            "artists": [
                { "name": "Carly Rae Jepsen",
                  "external_urls": { "spotify": "https://open.spotify.com/artist/2" } }
            ],
            "album": {
                "name": "Cut To The Feeling",
                "external_urls": { "spotify": "https://open.spotify.com/album/3" },
                "images": [
                    { "url": "https://i.scdn.co/image/a", "width": 640, "height": 640 },
                    { "url": "https://i.scdn.co/image/b", "width": 300, "height": 300 }
                ]
            },
            "external_urls": { "spotify": "https://open.spotify.com/track/4" }
        },
        "is_playing": true
    }"#;

    #[test]
    fn parses_currently_playing() {
        let playing: CurrentlyPlaying = serde_json::from_str(PLAYING).expect("valid document");
        let track = playing.item.expect("track present");
        assert_eq!(track.id, "11dFghVXANMlKmJXsNCbNl");
        assert_eq!(track.artists[0].name, "Carly Rae Jepsen");
        assert_eq!(track.album.images.len(), 2);
    }

    #[test]
    fn tolerates_missing_item() {
        let playing: CurrentlyPlaying =
            serde_json::from_str(r#"{ "is_playing": false }"#).expect("valid document");
        assert!(playing.item.is_none());
    }
}
