//! Real-time, budget-bounded voucher reward engine for luck campaigns.
//!
//! The public surface is [`engine::Engine`]: construct one with a
//! [`store::Store`] implementation, a [`clock::Clock`], an
//! [`rng::RngSource`], and a [`config::Config`], then either drive
//! [`processor::BatchProcessor::process_batch`] directly or enqueue
//! play requests onto [`aggregator::TickAggregator`] and let
//! [`engine::Engine::spawn_background_tasks`] run the tick and
//! lifecycle loops.

pub mod admin;
pub mod aggregator;
pub mod broadcaster;
pub mod budget;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod processor;
pub mod rng;
pub mod store;
pub mod sweeper;

pub use config::Config;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};

/// Install a `tracing` subscriber reading its filter from `RUST_LOG`
/// (default `info`). Call once at process startup; safe to call more
/// than once in tests, later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
