//! Error taxonomy for the reward engine.
//!
//! Mirrors the error table in the batch-processing specification: most
//! variants are handled internally (a per-user failure degrades to a
//! `LOSS`, never propagates), only whole-batch failures ever reach a
//! caller of [`crate::processor::BatchProcessor::process_batch`].

use thiserror::Error;

/// The canonical message recorded on every LOSS transaction whose cause
/// is not otherwise surfaced to the player.
pub const BETTER_LUCK_NEXT_TIME: &str = "Better luck next time!";

/// Errors produced anywhere in the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Game, voucher, or user absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Game is not in the status required for the attempted mutation.
    #[error("game state invalid: {0}")]
    StateInvalid(String),

    /// A candidate voucher did not fit the remaining budget or inventory.
    #[error("insufficient funds or inventory: {0}")]
    InsufficientFunds(String),

    /// Optimistic-concurrency or lock-timeout failure; safe to retry the
    /// whole batch.
    #[error("retryable conflict: {0}")]
    ConflictRetryable(String),

    /// Retry budget exhausted without a clean commit.
    #[error("conflict retries exhausted")]
    ConflictExhausted,

    /// A measured invariant (e.g. `actualSpend <= remainingBudget`) was
    /// violated at commit time and had to be clamped.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Store I/O or (de)serialization failure; always mapped to
    /// [`EngineError::ConflictRetryable`] before it reaches the retry loop.
    #[error("transient store error: {0}")]
    Transient(String),

    /// The request shape itself was invalid (empty batch id, empty
    /// username list, etc).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl EngineError {
    /// Whether the whole batch should be retried from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ConflictRetryable(_) | EngineError::Transient(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
