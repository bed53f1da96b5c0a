//! HTTP and websocket surface.
//!
//! Three routes, mirroring what clients consume:
//!
//! * `GET /api/now-playing` - the authoritative snapshot, 204 until the
//!   first successful resolution or while nothing is playing
//! * `GET /api/recently-played` - stateless pass-through listing
//! * `GET /ws/now-playing` - websocket push of one frame per track change
//!
//! Connection handlers never block the poll task: websocket subscribers
//! receive frames over their registry channel, and the query handlers only
//! take short read locks on the shared state.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use http::StatusCode;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    broadcast::Broadcaster,
    error::Result,
    gateway::Gateway,
    poll::SharedNowPlaying,
    tokens::TokenCache,
    track::TrackSnapshot,
};

/// State shared by all request handlers.
pub struct AppState {
    pub now_playing: SharedNowPlaying,
    pub broadcaster: Arc<Broadcaster>,
    pub gateway: Arc<Gateway>,
    pub tokens: Arc<TokenCache>,

    /// Entries returned by the recently-played listing.
    pub list_length: usize,
}

type SharedState = Arc<AppState>;

/// Builds the application router.
#[must_use]
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/now-playing", get(now_playing))
        .route("/api/recently-played", get(recently_played))
        .route("/ws/now-playing", get(ws_now_playing))
        .with_state(state)
}

/// Binds `address` and serves until the cancellation token fires.
pub async fn serve(
    state: SharedState,
    address: std::net::SocketAddr,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("listening on http://{address}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    Ok(())
}

/// `GET /api/now-playing`
async fn now_playing(State(state): State<SharedState>) -> Response {
    match state.now_playing.read().await.as_ref() {
        Some(now_playing) => Json(now_playing).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// `GET /api/recently-played`
///
/// A pass-through transform with no polling or dedup logic: fetch, project
/// to the song schema, return. Unusable entries are skipped rather than
/// failing the listing.
async fn recently_played(
    State(state): State<SharedState>,
) -> std::result::Result<Json<Vec<TrackSnapshot>>, (StatusCode, String)> {
    let bad_gateway = |e: String| (StatusCode::BAD_GATEWAY, e);

    let token = state
        .tokens
        .get(state.gateway.http_client())
        .await
        .map_err(|e| bad_gateway(e.to_string()))?;
    let page = state
        .gateway
        .recently_played(&token, state.list_length)
        .await
        .map_err(|e| bad_gateway(e.to_string()))?;

    let songs = page
        .items
        .iter()
        .filter_map(|entry| TrackSnapshot::from_track(&entry.track))
        .collect();

    Ok(Json(songs))
}

/// `GET /ws/now-playing`
async fn ws_now_playing(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(|socket| handle_subscriber(socket, state))
}

/// Manages one websocket subscription from registration to disconnect.
async fn handle_subscriber(socket: WebSocket, state: SharedState) {
    let id = Uuid::new_v4();
    let mut frames = state.broadcaster.subscribe(id).await;
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    debug!("subscriber {id} send failed: {e}");
                    break;
                }
            }
            message = stream.next() => {
                match message {
                    // Inbound payloads are ignored; the socket is push-only.
                    Some(Ok(message)) if !matches!(message, Message::Close(_)) => {}
                    _ => break,
                }
            }
        }
    }

    state.broadcaster.unsubscribe(id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::RwLock;

    use crate::{config::Config, http::Client as HttpClient, theme::{Rgb, Theme}, track::NowPlaying};

    fn state(now_playing: Option<NowPlaying>) -> SharedState {
        let config = Config::with_credentials(crate::config::Credentials {
            client_id: "id".to_owned(),
            client_secret: "secret".to_owned(),
            refresh_token: "refresh".to_owned(),
        });
        let http_client = HttpClient::new(&config).expect("http client");

        Arc::new(AppState {
            now_playing: Arc::new(RwLock::new(now_playing)),
            broadcaster: Arc::new(Broadcaster::new()),
            gateway: Arc::new(Gateway::new(http_client)),
            tokens: Arc::new(TokenCache::new(config.credentials.clone())),
            list_length: config.list_length,
        })
    }

    fn payload() -> NowPlaying {
        NowPlaying {
            track: TrackSnapshot {
                id: "t1".to_owned(),
                name: "Song".to_owned(),
                artist: "Artist".to_owned(),
                album: "Album".to_owned(),
                track_href: "https://open.spotify.com/track/1".parse().unwrap(),
                album_href: "https://open.spotify.com/album/1".parse().unwrap(),
                artist_href: "https://open.spotify.com/artist/1".parse().unwrap(),
                artwork_href: "https://i.scdn.co/image/1".parse().unwrap(),
            },
            theme: Theme {
                primary: Rgb { r: 0, g: 0, b: 0 },
                secondary: Rgb {
                    r: 255,
                    g: 255,
                    b: 255,
                },
            },
        }
    }

    #[tokio::test]
    async fn now_playing_is_no_content_before_first_resolution() {
        let response = now_playing(State(state(None))).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn now_playing_serves_the_snapshot() {
        let response = now_playing(State(state(Some(payload())))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
