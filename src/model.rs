//! Core entities of the reward engine.
//!
//! Each type corresponds 1:1 to a row family in the logical persistence
//! layout: `brands`, `vouchers`, `games`, `users`, `game_brand_links`,
//! `reward_transactions`. Types carry the invariants that the `Store`
//! contract is responsible for preserving across commits; they do not
//! enforce invariants themselves beyond what a plain constructor can
//! check, since cross-row invariants (budget, inventory) only hold at
//! the level of a committed transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type BrandId = i64;
pub type VoucherId = i64;
pub type GameId = i64;
pub type UserId = i64;

/// A brand funding one or more games out of its wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Brand {
    pub id: BrandId,
    pub name: String,
    /// Non-negative, scale-2. Mutated only by admin deposits and by
    /// game creation (debit of the contribution).
    pub wallet_balance: Decimal,
    /// Informational only; the engine never enforces it.
    pub daily_spend_limit: Decimal,
    pub is_active: bool,
}

/// A redeemable reward funded by a single brand.
///
/// Invariant V1: `current_quantity >= 0` at every committed state.
/// Invariant V2: `current_quantity <= initial_quantity` always.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Voucher {
    pub id: VoucherId,
    pub code: String,
    pub brand_id: BrandId,
    pub description: String,
    /// Positive, scale-2.
    pub cost: Decimal,
    pub initial_quantity: i64,
    pub current_quantity: i64,
    pub expiry_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    /// Monotonically increasing, used for optimistic concurrency on save.
    pub version: i64,
}

impl Voucher {
    /// A candidate voucher per spec.md 4.2 step 4: active, unexpired,
    /// in stock. Cost-vs-tick-budget filtering happens at the call site
    /// since it needs the tick budget, not just the voucher.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.current_quantity > 0
            && self.expiry_at.map(|exp| exp > now).unwrap_or(true)
    }
}

/// Lifecycle status of a [`Game`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
    BudgetExhausted,
}

/// One luck campaign: a fixed monetary budget spread over a fixed time
/// window, with a per-user win probability and a volatility factor that
/// lets a single tick spend slightly above the uniform per-second
/// average.
///
/// Invariant G1: `0 <= remaining_budget <= total_budget`.
/// Invariant G2: `status == Active` is required for any mutation that
/// decreases `remaining_budget`.
/// Invariant G3: if `remaining_budget == 0` after a committed batch,
/// status transitions to `BudgetExhausted`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Game {
    pub id: GameId,
    pub game_code: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_budget: Decimal,
    pub remaining_budget: Decimal,
    pub status: GameStatus,
    pub win_probability: Decimal,
    pub volatility_factor: Decimal,
    pub version: i64,
}

impl Game {
    /// `status == ACTIVE && now < endTime && remainingBudget > 0`, the
    /// predicate spec.md 4.2 step 2 calls `isActiveAndFunded`.
    pub fn is_active_and_funded(&self, now: DateTime<Utc>) -> bool {
        self.status == GameStatus::Active && now < self.end_time && self.remaining_budget > Decimal::ZERO
    }
}

/// Immutable link recording that a brand contributed funds to a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameBrandLink {
    pub game_id: GameId,
    pub brand_id: BrandId,
    pub contribution_amount: Decimal,
    pub is_locked: bool,
}

/// A player, created on demand the first time a batch references their
/// username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub last_played_at: Option<DateTime<Utc>>,
}

/// Outcome of one user's participation in one batch.
///
/// Invariant T1: for a given `batch_id`, one transaction exists per
/// username listed in that batch, after a successful commit.
/// Invariant T2: `status == Win ⇒ voucher_id.is_some() && amount ==
/// Some(voucher.cost at award time)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Win,
    Loss,
    Pending,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RewardTransaction {
    pub id: i64,
    pub user_id: UserId,
    /// Denormalized from `users.username` at write time so a replayed
    /// batch can reconstruct the exact same `RewardResponse` without a
    /// second lookup (spec.md 4.2 idempotence law).
    pub username: String,
    pub game_id: GameId,
    pub voucher_id: Option<VoucherId>,
    pub batch_id: String,
    pub status: TransactionStatus,
    pub amount: Option<Decimal>,
    pub reward_message: String,
    pub created_at: DateTime<Utc>,
}
