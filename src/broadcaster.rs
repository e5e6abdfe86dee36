//! Result broadcaster: fans out each batch's [`BatchResult`] to whatever
//! is listening for that game (spec.md §4.4). One `broadcast` channel
//! per game, created lazily on first subscribe or publish — the
//! `emit_*` helper convention blendizzard uses for domain events,
//! adapted from a contract-event bus to an in-process pub/sub one.

use crate::model::GameId;
use crate::processor::BatchResult;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::trace;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
pub struct ResultBroadcaster {
    channels: RwLock<HashMap<GameId, broadcast::Sender<BatchResult>>>,
}

impl ResultBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to results for `game_id`, creating its channel if this
    /// is the first subscriber.
    pub async fn subscribe(&self, game_id: GameId) -> broadcast::Receiver<BatchResult> {
        let mut map = self.channels.write().await;
        map.entry(game_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a result for `game_id`. A send with no subscribers is a
    /// normal no-op, not an error.
    pub async fn publish(&self, game_id: GameId, result: BatchResult) {
        let mut map = self.channels.write().await;
        let sender = map.entry(game_id).or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        if sender.send(result).is_err() {
            trace!(game_id, "published batch result with no active subscribers");
        }
    }
}
