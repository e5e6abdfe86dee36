//! The persistence contract (spec.md §4.7).
//!
//! `Store` is the seam the batch processor is written against. Any
//! engine that can hand out a row-exclusive lock per game/voucher and
//! check an optimistic `version` field on save satisfies it — a
//! Postgres adapter using `SELECT ... FOR UPDATE` plus `UPDATE ... WHERE
//! version = $n` is a drop-in implementation; this crate ships only the
//! in-memory reference implementation used by every test.

pub mod memory;

use crate::error::EngineResult;
use crate::model::{Brand, BrandId, Game, GameBrandLink, GameId, RewardTransaction, User, Voucher, VoucherId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::ops::{Deref, DerefMut};
use tokio::sync::OwnedMutexGuard;

/// An exclusive, held-until-dropped lock on one game row.
pub struct GameLock {
    pub(crate) guard: OwnedMutexGuard<Game>,
}

impl Deref for GameLock {
    type Target = Game;
    fn deref(&self) -> &Game {
        &self.guard
    }
}

impl DerefMut for GameLock {
    fn deref_mut(&mut self) -> &mut Game {
        &mut self.guard
    }
}

/// An exclusive, held-until-dropped lock on one voucher row.
pub struct VoucherLock {
    pub(crate) guard: OwnedMutexGuard<Voucher>,
}

impl Deref for VoucherLock {
    type Target = Voucher;
    fn deref(&self) -> &Voucher {
        &self.guard
    }
}

impl DerefMut for VoucherLock {
    fn deref_mut(&mut self) -> &mut Voucher {
        &mut self.guard
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // Games
    // ------------------------------------------------------------------

    async fn find_game(&self, id: GameId) -> EngineResult<Option<Game>>;

    /// Blocks until the exclusive row lock on `id` is acquired.
    async fn lock_game(&self, id: GameId) -> EngineResult<GameLock>;

    /// Persist `updated` through an already-held lock, checking that
    /// `updated.version` still matches the version last read through
    /// this lock before bumping it. Returns `ConflictRetryable` on a
    /// version mismatch.
    async fn save_game(&self, lock: &mut GameLock, updated: Game) -> EngineResult<()>;

    async fn create_game(&self, game: Game, links: Vec<GameBrandLink>) -> EngineResult<Game>;

    async fn find_game_brand_links(&self, game_id: GameId) -> EngineResult<Vec<GameBrandLink>>;

    /// Games with `status = SCHEDULED && startTime <= now`.
    async fn games_due_to_activate(&self, now: DateTime<Utc>) -> EngineResult<Vec<GameId>>;

    /// Games with `status = ACTIVE && endTime <= now`.
    async fn games_due_to_complete(&self, now: DateTime<Utc>) -> EngineResult<Vec<GameId>>;

    /// Single-row transition, no escalation beyond the row itself
    /// (spec.md §4.5).
    async fn activate_game(&self, id: GameId) -> EngineResult<()>;
    async fn complete_game(&self, id: GameId) -> EngineResult<()>;

    // ------------------------------------------------------------------
    // Vouchers
    // ------------------------------------------------------------------

    /// Active, unexpired, in-stock vouchers funded by brands linked to
    /// `game_id`, whose cost does not exceed `max_cost`.
    async fn find_candidate_vouchers(
        &self,
        game_id: GameId,
        max_cost: Decimal,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<Voucher>>;

    async fn lock_voucher(&self, id: VoucherId) -> EngineResult<VoucherLock>;

    async fn save_voucher(&self, lock: &mut VoucherLock, updated: Voucher) -> EngineResult<()>;

    async fn create_voucher(&self, voucher: Voucher) -> EngineResult<Voucher>;

    async fn find_voucher(&self, id: VoucherId) -> EngineResult<Option<Voucher>>;

    async fn restock_voucher(&self, id: VoucherId, additional: i64) -> EngineResult<Voucher>;

    async fn deactivate_voucher(&self, id: VoucherId) -> EngineResult<Voucher>;

    // ------------------------------------------------------------------
    // Brands
    // ------------------------------------------------------------------

    async fn find_brand(&self, id: BrandId) -> EngineResult<Option<Brand>>;

    async fn create_brand(&self, brand: Brand) -> EngineResult<Brand>;

    async fn deposit_to_brand(&self, id: BrandId, amount: Decimal) -> EngineResult<Brand>;

    /// Debit `amount` from the brand's wallet; fails with
    /// `InsufficientFunds` if the wallet cannot cover it.
    async fn debit_brand(&self, id: BrandId, amount: Decimal) -> EngineResult<Brand>;

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    async fn find_or_create_user(&self, username: &str) -> EngineResult<User>;

    async fn touch_user_last_played(&self, user_id: crate::model::UserId, at: DateTime<Utc>) -> EngineResult<()>;

    // ------------------------------------------------------------------
    // Reward transactions / idempotency
    // ------------------------------------------------------------------

    async fn exists_batch(&self, batch_id: &str) -> EngineResult<bool>;

    async fn transactions_for_batch(&self, batch_id: &str) -> EngineResult<Vec<RewardTransaction>>;

    async fn insert_transaction(&self, tx: RewardTransaction) -> EngineResult<RewardTransaction>;
}
