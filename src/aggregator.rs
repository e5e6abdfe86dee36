//! Tick aggregator: collects per-game play requests arriving between
//! ticks and flushes each game's buffer as one batch on a fixed period
//! (spec.md §4.3). Grounded on the same periodic-drain shape as a
//! generic interval-driven task scheduler, fanned out per game the way
//! `epoch.rs::cycle_epoch` iterates every registered game each cycle.

use crate::config::Config;
use crate::model::GameId;
use crate::processor::{BatchProcessor, BatchRequest};
use crate::store::Store;
use crate::broadcaster::ResultBroadcaster;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

pub struct TickAggregator<St: Store> {
    buffers: Mutex<HashMap<GameId, Vec<String>>>,
    processor: Arc<BatchProcessor<St>>,
    broadcaster: Arc<ResultBroadcaster>,
    config: Config,
}

impl<St: Store + 'static> TickAggregator<St> {
    pub fn new(processor: Arc<BatchProcessor<St>>, broadcaster: Arc<ResultBroadcaster>, config: Config) -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
            processor,
            broadcaster,
            config,
        }
    }

    /// Enqueue one play request. Returns immediately; the request is
    /// picked up by the next tick's flush.
    pub async fn enqueue(&self, game_id: GameId, username: String) {
        self.buffers.lock().await.entry(game_id).or_default().push(username);
    }

    /// Drain every non-empty buffer and process each game's batch
    /// concurrently — one game's lock contention never delays another
    /// game's tick. Called once per tick by [`Self::spawn_loop`], and
    /// directly by tests that want deterministic control over flushing.
    pub async fn flush_all(&self) {
        let drained: Vec<(GameId, Vec<String>)> = {
            let mut buffers = self.buffers.lock().await;
            buffers.drain().filter(|(_, usernames)| !usernames.is_empty()).collect()
        };

        let flushes = drained.into_iter().map(|(game_id, usernames)| self.flush_one(game_id, usernames));
        futures::future::join_all(flushes).await;
    }

    async fn flush_one(&self, game_id: GameId, mut usernames: Vec<String>) {
        if usernames.len() > self.config.max_batch_size {
            let dropped = usernames.len() - self.config.max_batch_size;
            warn!(
                game_id,
                dropped,
                kept = self.config.max_batch_size,
                "tick batch exceeded max_batch_size; truncating, oldest-enqueued kept"
            );
            usernames.truncate(self.config.max_batch_size);
        }

        let req = BatchRequest {
            batch_id: Uuid::new_v4().to_string(),
            game_id,
            usernames,
            timestamp: None,
        };

        match self.processor.process_batch(req).await {
            Ok(result) => self.broadcaster.publish(game_id, result).await,
            Err(e) => error!(game_id, error = %e, "batch processing failed; requests are lost for this tick"),
        }
    }

    /// Run the flush loop on `config.tick_period_ms` until aborted.
    pub fn spawn_loop(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.tick_period();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                self.flush_all().await;
            }
        })
    }
}
