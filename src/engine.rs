//! The composition root: wires store, clock, rng, and config into the
//! processor, aggregator, broadcaster, sweeper, and admin surface, and
//! owns their background tasks. Plays the role blendizzard's
//! `#[contract] struct` composition root plays for this crate, per
//! the REDESIGN FLAGS note that this engine should be a plain DI value
//! rather than a set of free functions reaching for global state.

use crate::admin::AdminSurface;
use crate::aggregator::TickAggregator;
use crate::broadcaster::ResultBroadcaster;
use crate::clock::Clock;
use crate::config::Config;
use crate::processor::BatchProcessor;
use crate::rng::RngSource;
use crate::sweeper::LifecycleSweeper;
use crate::store::Store;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct Engine<St: Store + 'static> {
    pub store: Arc<St>,
    pub clock: Arc<dyn Clock>,
    pub rng: Arc<dyn RngSource>,
    pub config: Config,
    pub processor: Arc<BatchProcessor<St>>,
    pub aggregator: Arc<TickAggregator<St>>,
    pub broadcaster: Arc<ResultBroadcaster>,
    pub sweeper: Arc<LifecycleSweeper<St>>,
    pub admin: AdminSurface<St>,
}

impl<St: Store + 'static> Engine<St> {
    pub fn new(store: Arc<St>, clock: Arc<dyn Clock>, rng: Arc<dyn RngSource>, config: Config) -> Self {
        let processor = Arc::new(BatchProcessor::new(store.clone(), clock.clone(), rng.clone(), config.clone()));
        let broadcaster = Arc::new(ResultBroadcaster::new());
        let aggregator = Arc::new(TickAggregator::new(processor.clone(), broadcaster.clone(), config.clone()));
        let sweeper = Arc::new(LifecycleSweeper::new(store.clone(), clock.clone(), config.clone()));
        let admin = AdminSurface::new(store.clone(), clock.clone(), config.clone());

        Self {
            store,
            clock,
            rng,
            config,
            processor,
            aggregator,
            broadcaster,
            sweeper,
            admin,
        }
    }

    /// Start the tick aggregator and lifecycle sweeper as background
    /// tasks. The caller owns the returned handles and decides when to
    /// abort them (e.g. on shutdown).
    pub fn spawn_background_tasks(&self) -> EngineTasks {
        EngineTasks {
            aggregator: self.aggregator.clone().spawn_loop(),
            sweeper: self.sweeper.clone().spawn_loop(),
        }
    }
}

pub struct EngineTasks {
    pub aggregator: JoinHandle<()>,
    pub sweeper: JoinHandle<()>,
}

impl EngineTasks {
    pub fn abort(&self) {
        self.aggregator.abort();
        self.sweeper.abort();
    }
}
