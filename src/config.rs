//! Engine-wide tunables (spec.md §6 "recognized configuration options").
//!
//! Defaults match the spec exactly; every field can be overridden from
//! the process environment (`LUCKSPIN_*`) via [`Config::from_env`], the
//! same "defaults baked in, environment overlays" shape blendizzard's
//! `types.rs::Config` uses for its ledger constants.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

fn default_tick_period_ms() -> u64 {
    1000
}

fn default_win_probability() -> Decimal {
    Decimal::new(15, 2) // 0.15
}

fn default_volatility_factor() -> Decimal {
    Decimal::new(12, 1) // 1.2
}

fn default_max_batch_size() -> usize {
    5000
}

fn default_batch_retry_count() -> u32 {
    3
}

fn default_batch_retry_backoff_ms() -> u64 {
    10
}

fn default_money_scale() -> u32 {
    2
}

fn default_sweeper_interval_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How often the tick aggregator flushes each game's buffer.
    pub tick_period_ms: u64,
    /// Win probability assigned to a game that doesn't specify its own.
    pub default_win_probability: Decimal,
    /// Volatility factor assigned to a game that doesn't specify its own.
    pub default_volatility_factor: Decimal,
    /// Hard cap on users flushed into a single batch; excess is dropped
    /// and logged, oldest-enqueued-first kept.
    pub max_batch_size: usize,
    /// Whole-batch retry attempts on a retryable conflict.
    pub batch_retry_count: u32,
    /// Base unit (ms) for the retry backoff curve: `base * attempt +
    /// (base / 2) * attempt^2`.
    pub batch_retry_backoff_ms: u64,
    /// Decimal places money amounts are rounded to.
    pub money_scale: u32,
    /// How often the lifecycle sweeper checks for due transitions.
    pub sweeper_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_period_ms: default_tick_period_ms(),
            default_win_probability: default_win_probability(),
            default_volatility_factor: default_volatility_factor(),
            max_batch_size: default_max_batch_size(),
            batch_retry_count: default_batch_retry_count(),
            batch_retry_backoff_ms: default_batch_retry_backoff_ms(),
            money_scale: default_money_scale(),
            sweeper_interval_ms: default_sweeper_interval_ms(),
        }
    }
}

impl Config {
    /// Overlay environment variables prefixed `LUCKSPIN_` (e.g.
    /// `LUCKSPIN_TICK_PERIOD_MS`) on top of the defaults.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("LUCKSPIN_").from_env::<Config>()
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn sweeper_interval(&self) -> Duration {
        Duration::from_millis(self.sweeper_interval_ms)
    }

    /// Backoff before retrying the `attempt`-th whole-batch attempt,
    /// `base * attempt + (base / 2) * attempt^2`.
    pub fn backoff_for_attempt(&self, attempt: u64) -> Duration {
        let base = self.batch_retry_backoff_ms;
        Duration::from_millis(base * attempt + (base / 2).max(1) * attempt * attempt)
    }
}
