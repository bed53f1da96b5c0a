//! End-to-end poll loop behavior against a scripted player source.
//!
//! Runs the real poll state machine under paused tokio time, feeding it a
//! fixed sequence of fetch outcomes and asserting on the frames that reach
//! a registered subscriber.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use url::Url;

use nowplayd::{
    broadcast::{Broadcaster, EMPTY_PAYLOAD},
    gateway::FetchError,
    poll::{PlayerSource, PollLoop, SharedNowPlaying, SourceError},
    protocol::player::CurrentlyPlaying,
    tokens::TokenError,
};

type PlayStep = Result<Option<CurrentlyPlaying>, SourceError>;
type ArtworkStep = nowplayd::error::Result<Vec<u8>>;

/// Scripted [`PlayerSource`]: pops one step per fetch and parks forever
/// once the script is exhausted.
#[derive(Clone, Default)]
struct ScriptedSource {
    plays: Arc<Mutex<VecDeque<PlayStep>>>,
    artwork: Arc<Mutex<VecDeque<ArtworkStep>>>,
    fetch_times: Arc<Mutex<Vec<tokio::time::Instant>>>,
}

impl ScriptedSource {
    fn push_play(&self, step: PlayStep) {
        self.plays.lock().unwrap().push_back(step);
    }

    fn push_artwork(&self, step: ArtworkStep) {
        self.artwork.lock().unwrap().push_back(step);
    }

    fn fetch_times(&self) -> Vec<tokio::time::Instant> {
        self.fetch_times.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlayerSource for ScriptedSource {
    async fn currently_playing(&self) -> Result<Option<CurrentlyPlaying>, SourceError> {
        self.fetch_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        let step = self.plays.lock().unwrap().pop_front();
        match step {
            Some(step) => step,
            None => std::future::pending().await,
        }
    }

    async fn artwork(&self, _url: &Url) -> nowplayd::error::Result<Vec<u8>> {
        let step = self.artwork.lock().unwrap().pop_front();
        step.unwrap_or_else(|| Ok(artwork_png()))
    }
}

/// A 4x4 two-color PNG, enough for theme derivation.
fn artwork_png() -> Vec<u8> {
    let mut image = image::RgbImage::from_pixel(4, 4, image::Rgb([20, 20, 20]));
    image.put_pixel(0, 0, image::Rgb([240, 240, 240]));
    let mut bytes = Vec::new();
    image
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .expect("png encoding");
    bytes
}

fn playing(track_id: &str) -> PlayStep {
    let document = serde_json::from_value(serde_json::json!({
        "context": { "external_urls": { "spotify": "https://open.spotify.com/playlist/p" } },
        "item": {
            "id": track_id,
            "name": format!("Song {track_id}"),
            "artists": [
                { "name": "Artist",
                  "external_urls": { "spotify": "https://open.spotify.com/artist/a" } }
            ],
            "album": {
                "name": "Album",
                "external_urls": { "spotify": "https://open.spotify.com/album/b" },
                "images": [ { "url": "https://i.scdn.co/image/c", "width": 64, "height": 64 } ]
            },
            "external_urls": { "spotify": format!("https://open.spotify.com/track/{track_id}") }
        },
        "is_playing": true
    }))
    .expect("valid player document");
    Ok(Some(document))
}

fn nothing_playing() -> PlayStep {
    Ok(None)
}

struct Harness {
    source: ScriptedSource,
    frames: tokio::sync::mpsc::Receiver<String>,
    state: SharedNowPlaying,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<Result<(), nowplayd::poll::FatalError>>,
}

async fn start(source: ScriptedSource) -> Harness {
    let broadcaster = Arc::new(Broadcaster::new());
    let frames = broadcaster.subscribe(uuid::Uuid::new_v4()).await;
    let state: SharedNowPlaying = Arc::new(RwLock::new(None));
    let cancel = CancellationToken::new();

    let poll = PollLoop::new(
        source.clone(),
        Arc::clone(&broadcaster),
        Arc::clone(&state),
        Duration::from_secs(1),
        4,
    );
    let handle = tokio::spawn(poll.run(cancel.clone()));

    Harness {
        source,
        frames,
        state,
        cancel,
        handle,
    }
}

impl Harness {
    /// Lets `ticks` poll intervals elapse on the paused clock.
    async fn run_ticks(&self, ticks: u64) {
        tokio::time::sleep(Duration::from_secs(ticks) + Duration::from_millis(50)).await;
    }

    fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.frames.try_recv() {
            frames.push(frame);
        }
        frames
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        self.handle.await.expect("poll task").expect("clean exit");
    }
}

#[tokio::test(start_paused = true)]
async fn broadcasts_once_per_identity_transition() {
    let source = ScriptedSource::default();
    // nothing -> A -> A (repeat) -> B -> nothing
    source.push_play(nothing_playing());
    source.push_play(playing("aaa"));
    source.push_play(playing("aaa"));
    source.push_play(playing("bbb"));
    source.push_play(nothing_playing());

    let mut harness = start(source).await;
    harness.run_ticks(5).await;

    let frames = harness.drain();
    assert_eq!(frames.len(), 3, "one frame per accepted transition");

    let first: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(first["name"], "Song aaa");
    assert!(first["theme"]["primary"].is_array());

    let second: serde_json::Value = serde_json::from_str(&frames[1]).unwrap();
    assert_eq!(second["name"], "Song bbb");

    assert_eq!(frames[2], EMPTY_PAYLOAD);
    assert!(harness.state.read().await.is_none());

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn initial_nothing_playing_is_not_broadcast() {
    let source = ScriptedSource::default();
    source.push_play(nothing_playing());
    source.push_play(nothing_playing());

    let mut harness = start(source).await;
    harness.run_ticks(2).await;

    assert!(harness.drain().is_empty(), "empty to empty is no transition");
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transient_failures_do_not_change_state() {
    let source = ScriptedSource::default();
    source.push_play(playing("aaa"));
    source.push_play(Err(SourceError::Fetch(FetchError::Server(
        http::StatusCode::INTERNAL_SERVER_ERROR,
    ))));
    source.push_play(Err(SourceError::Auth(TokenError::Refused(
        http::StatusCode::BAD_REQUEST,
    ))));
    // Malformed document: 200 with no track section.
    source.push_play(Ok(Some(
        serde_json::from_value(serde_json::json!({ "is_playing": false })).unwrap(),
    )));

    let mut harness = start(source).await;
    harness.run_ticks(4).await;

    let frames = harness.drain();
    assert_eq!(frames.len(), 1, "only the initial transition broadcasts");
    assert!(harness.state.read().await.is_some(), "state survives failures");

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn rate_limit_defers_the_next_fetch() {
    let source = ScriptedSource::default();
    source.push_play(Err(SourceError::Fetch(FetchError::RateLimited {
        retry_after: Duration::from_secs(5),
    })));
    source.push_play(nothing_playing());

    let harness = start(source).await;
    // 1s to the first tick, 5s backoff, 1s to the next tick; stop short
    // of the tick after that.
    tokio::time::sleep(Duration::from_millis(7_500)).await;

    let times = harness.source.fetch_times();
    assert_eq!(times.len(), 2);
    assert!(
        times[1] - times[0] >= Duration::from_secs(5),
        "next fetch no sooner than the server-specified delay"
    );

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn artwork_failure_abandons_the_tick_then_recovers() {
    let source = ScriptedSource::default();
    source.push_play(playing("aaa"));
    source.push_artwork(Err(nowplayd::error::Error::unavailable(
        "artwork fetch failed",
    )));
    source.push_play(playing("aaa"));

    let mut harness = start(source).await;
    harness.run_ticks(2).await;

    let frames = harness.drain();
    assert_eq!(frames.len(), 1, "retry produces exactly one broadcast");
    assert!(harness.state.read().await.is_some());

    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn client_side_failure_is_fatal() {
    let source = ScriptedSource::default();
    source.push_play(Err(SourceError::Fetch(FetchError::Client(
        http::StatusCode::FORBIDDEN,
    ))));

    let harness = start(source).await;
    let result = harness.handle.await.expect("poll task");
    tokio_test::assert_err!(result, "loop terminates with the fatal error");
}
