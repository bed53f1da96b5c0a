//! Subscriber registry and now-playing fan-out.
//!
//! Connection handlers register themselves with [`Broadcaster::subscribe`]
//! and receive serialized payload frames over a bounded channel; the poll
//! loop publishes one frame per accepted track transition. Membership and
//! fan-out are serialized through one lock, so connects and disconnects
//! during a broadcast cannot race the iteration: `publish` snapshots the
//! membership and fans out outside the lock.
//!
//! Per-subscriber failures are isolated. A subscriber whose channel is
//! closed or full is logged, dropped from the registry, and the remaining
//! subscribers still get the frame.

use std::collections::HashMap;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::track::NowPlaying;

/// Frames a subscriber receives: the serialized payload text.
pub type Frame = String;

/// Sentinel payload broadcast when nothing is playing.
pub const EMPTY_PAYLOAD: &str = "{}";

/// Number of frames a subscriber may lag before being dropped.
///
/// Track changes arrive at human cadence, so even a small buffer only
/// fills when the peer has stopped reading.
const CHANNEL_CAPACITY: usize = 16;

/// Registry of live subscribers plus the fan-out itself.
#[derive(Default)]
pub struct Broadcaster {
    subscribers: Mutex<HashMap<Uuid, mpsc::Sender<Frame>>>,
}

impl Broadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id` and returns the receiving end of its frame channel.
    ///
    /// Subscribing an already-registered id replaces its channel: the
    /// membership set is unchanged and the stale receiver closes.
    pub async fn subscribe(&self, id: Uuid) -> mpsc::Receiver<Frame> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        if self.subscribers.lock().await.insert(id, tx).is_some() {
            debug!("subscriber {id} re-registered");
        } else {
            debug!("subscriber {id} registered");
        }
        rx
    }

    /// Removes `id` from the registry.
    ///
    /// Removing an unknown id is a no-op; duplicate or late disconnect
    /// notifications are routine.
    pub async fn unsubscribe(&self, id: Uuid) {
        if self.subscribers.lock().await.remove(&id).is_some() {
            debug!("subscriber {id} unregistered");
        }
    }

    /// Number of currently registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Serializes `state` once and sends the frame to every subscriber.
    ///
    /// `None` broadcasts the empty sentinel payload. Returns the number of
    /// subscribers the frame was delivered to.
    pub async fn publish(&self, state: Option<&NowPlaying>) -> usize {
        let frame = match state {
            Some(now_playing) => match serde_json::to_string(now_playing) {
                Ok(frame) => frame,
                Err(e) => {
                    // Serialization of our own types cannot fail in practice.
                    error!("now-playing payload not serializable: {e}");
                    return 0;
                }
            },
            None => EMPTY_PAYLOAD.to_owned(),
        };

        // Snapshot membership, then fan out without holding the lock.
        let members: Vec<(Uuid, mpsc::Sender<Frame>)> = self
            .subscribers
            .lock()
            .await
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut stale = Vec::new();
        for (id, tx) in members {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("dropping subscriber {id}: {e}");
                    stale.push(id);
                }
            }
        }

        if !stale.is_empty() {
            let mut subscribers = self.subscribers.lock().await;
            for id in stale {
                subscribers.remove(&id);
            }
        }

        debug!("published now-playing frame to {delivered} subscribers");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_is_idempotent_per_id() {
        let broadcaster = Broadcaster::new();
        let id = Uuid::new_v4();

        let _first = broadcaster.subscribe(id).await;
        let _second = broadcaster.subscribe(id).await;

        assert_eq!(broadcaster.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn unsubscribe_unknown_id_is_noop() {
        let broadcaster = Broadcaster::new();
        broadcaster.unsubscribe(Uuid::new_v4()).await;
        assert_eq!(broadcaster.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let broadcaster = Broadcaster::new();
        let mut first = broadcaster.subscribe(Uuid::new_v4()).await;
        let mut second = broadcaster.subscribe(Uuid::new_v4()).await;

        let delivered = broadcaster.publish(None).await;
        assert_eq!(delivered, 2);
        assert_eq!(first.recv().await.expect("frame"), EMPTY_PAYLOAD);
        assert_eq!(second.recv().await.expect("frame"), EMPTY_PAYLOAD);
    }

    #[tokio::test]
    async fn failed_subscriber_is_isolated_and_dropped() {
        let broadcaster = Broadcaster::new();
        let dead = Uuid::new_v4();
        // Dropping the receiver closes the channel and fails the send.
        drop(broadcaster.subscribe(dead).await);
        let mut live = broadcaster.subscribe(Uuid::new_v4()).await;

        let delivered = broadcaster.publish(None).await;
        assert_eq!(delivered, 1);
        assert_eq!(live.recv().await.expect("frame"), EMPTY_PAYLOAD);
        assert_eq!(broadcaster.subscriber_count().await, 1);
    }
}
