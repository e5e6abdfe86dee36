//! The batch processor: the transactional decision engine for one batch
//! (spec.md §4.2). This is the hard-engineering core of the whole
//! system — everything else exists to feed it shuffled user lists and
//! publish what it decides.

use crate::budget::tick_budget;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{EngineError, EngineResult, BETTER_LUCK_NEXT_TIME};
use crate::model::{Game, GameId, RewardTransaction, TransactionStatus, Voucher, VoucherId};
use crate::rng::{self, RngSource};
use crate::store::Store;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info_span, warn, Instrument};

/// A seam for test code to reach inside a running batch between user
/// iterations (used by scenario S3, where a game is forced out of ACTIVE
/// mid-batch). Production callers never set this.
pub type AfterUserHook = Arc<dyn Fn(usize, &mut Game) + Send + Sync>;

/// `POST /api/rewards/process-batch` request shape (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub batch_id: String,
    pub game_id: GameId,
    pub usernames: Vec<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardStatus {
    Win,
    Loss,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRewardResult {
    pub username: String,
    pub status: RewardStatus,
    pub voucher_id: Option<VoucherId>,
    pub voucher_code: Option<String>,
    pub amount: Option<Decimal>,
    pub message: String,
}

impl UserRewardResult {
    fn loss(username: String) -> Self {
        Self {
            username,
            status: RewardStatus::Loss,
            voucher_id: None,
            voucher_code: None,
            amount: None,
            message: BETTER_LUCK_NEXT_TIME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: String,
    pub processed_at: DateTime<Utc>,
    pub rewards: Vec<UserRewardResult>,
    pub total_spent: Decimal,
    pub processing_time_ms: u64,
}

/// Outcome of trying one candidate voucher for one user. Mirrors the
/// "explicit result variants instead of exception-driven control flow"
/// re-architecture note (spec.md §9).
enum CandidateOutcome {
    Awarded(Voucher, Decimal),
    Skipped,
}

pub struct BatchProcessor<St: Store> {
    store: Arc<St>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RngSource>,
    config: Config,
    after_user_hook: Option<AfterUserHook>,
}

impl<St: Store> BatchProcessor<St> {
    pub fn new(store: Arc<St>, clock: Arc<dyn Clock>, rng: Arc<dyn RngSource>, config: Config) -> Self {
        Self {
            store,
            clock,
            rng,
            config,
            after_user_hook: None,
        }
    }

    /// Test-only: inject a callback invoked after each user has been
    /// resolved, with mutable access to the in-flight (not yet
    /// committed) game snapshot. Lets tests reproduce scenario S3
    /// (game transitions out of ACTIVE mid-batch).
    pub fn with_after_user_hook(mut self, hook: AfterUserHook) -> Self {
        self.after_user_hook = Some(hook);
        self
    }

    /// Process one batch to completion, retrying the whole attempt up
    /// to `batch_retry_count` times on a retryable conflict.
    pub async fn process_batch(&self, req: BatchRequest) -> EngineResult<BatchResult> {
        if req.batch_id.trim().is_empty() {
            return Err(EngineError::InvalidRequest("batchId must not be empty".into()));
        }
        if req.usernames.is_empty() {
            return Err(EngineError::InvalidRequest("usernames must not be empty".into()));
        }

        let span = info_span!("process_batch", batch_id = %req.batch_id, game_id = req.game_id);
        async {
            let max_attempts = self.config.batch_retry_count.max(1);
            let mut last_err = None;

            for attempt in 1..=max_attempts {
                match self.attempt_batch(&req).await {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_attempts => {
                        warn!(attempt, error = %e, "retrying batch after conflict");
                        let backoff = self.config.backoff_for_attempt(attempt as u64);
                        tokio::time::sleep(backoff).await;
                        last_err = Some(e);
                    }
                    Err(e) if e.is_retryable() => {
                        error!(attempts = attempt, error = %e, "batch retries exhausted");
                        return Err(EngineError::ConflictExhausted);
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(last_err.unwrap_or(EngineError::ConflictExhausted))
        }
        .instrument(span)
        .await
    }

    async fn attempt_batch(&self, req: &BatchRequest) -> EngineResult<BatchResult> {
        let start = std::time::Instant::now();
        let now = req.timestamp.unwrap_or_else(|| self.clock.now());

        // Step 1: idempotency probe.
        if self.store.exists_batch(&req.batch_id).await? {
            return self.reconstruct_result(req, start).await;
        }

        // Step 2: game lock.
        let mut lock = match self.store.lock_game(req.game_id).await {
            Ok(lock) => lock,
            Err(EngineError::NotFound(_)) => {
                return self.all_loss(req, Decimal::ZERO, start).await;
            }
            Err(e) => return Err(e),
        };

        if !lock.is_active_and_funded(now) {
            return self.all_loss(req, Decimal::ZERO, start).await;
        }

        // Step 3: tick budget, computed from the just-locked game state.
        let game_snapshot_for_budget: Game = lock.clone();
        let tick = tick_budget(&game_snapshot_for_budget, now, self.config.money_scale);
        let remaining_at_start = lock.remaining_budget;

        // Step 4: candidate vouchers.
        let candidates = self.store.find_candidate_vouchers(req.game_id, tick, now).await?;
        if candidates.is_empty() || tick <= Decimal::ZERO {
            return self.all_loss(req, Decimal::ZERO, start).await;
        }

        // Step 5: shuffle users — the fairness anchor under bursty arrivals.
        let mut shuffled = req.usernames.clone();
        rng::shuffle(self.rng.as_ref(), &mut shuffled);

        // Resolve every user up front so a mid-batch early exit (budget
        // exhaustion or the game going inactive) can still record the
        // correct user_id on every skipped user's LOSS transaction.
        let mut users = Vec::with_capacity(shuffled.len());
        for username in &shuffled {
            users.push(self.store.find_or_create_user(username).await?);
        }

        // Step 6: per-user loop.
        let mut game_snapshot = lock.clone();
        let mut spent = Decimal::ZERO;
        let mut rewards: Vec<UserRewardResult> = Vec::with_capacity(shuffled.len());
        let mut pending_tx: Vec<RewardTransaction> = Vec::with_capacity(shuffled.len());

        let win_probability_f64 = {
            use rust_decimal::prelude::ToPrimitive;
            game_snapshot.win_probability.to_f64().unwrap_or(0.0)
        };

        for (idx, username) in shuffled.iter().enumerate() {
            let user = &users[idx];

            // b. re-read game state under lock.
            if !game_snapshot.is_active_and_funded(now) {
                self.fill_remaining_loss(&shuffled, &users, idx, &mut rewards, &mut pending_tx, req, now);
                break;
            }

            // c. roll for a win.
            let roll = self.rng.roll_unit();
            if roll > win_probability_f64 {
                rewards.push(UserRewardResult::loss(username.clone()));
                pending_tx.push(loss_transaction(req, user.id, username.clone(), now));
                self.after_user_hook_tick(idx, &mut game_snapshot);
                if self.should_stop_early(spent, tick, remaining_at_start) {
                    self.fill_remaining_loss(&shuffled, &users, idx + 1, &mut rewards, &mut pending_tx, req, now);
                    break;
                }
                continue;
            }

            // d. shuffle candidates for selection and try each in order.
            let mut pool = candidates.clone();
            rng::shuffle(self.rng.as_ref(), &mut pool);

            let mut outcome = CandidateOutcome::Skipped;
            for candidate in &pool {
                if spent + candidate.cost > tick || spent + candidate.cost > remaining_at_start {
                    continue;
                }

                match self.try_award(candidate.id, spent, tick, remaining_at_start, now).await {
                    Ok(Some((voucher, cost))) => {
                        outcome = CandidateOutcome::Awarded(voucher, cost);
                        break;
                    }
                    Ok(None) => continue,
                    Err(e) if e.is_retryable() => return Err(e),
                    Err(e) => return Err(e),
                }
            }

            match outcome {
                CandidateOutcome::Awarded(voucher, cost) => {
                    spent += cost;
                    rewards.push(UserRewardResult {
                        username: username.clone(),
                        status: RewardStatus::Win,
                        voucher_id: Some(voucher.id),
                        voucher_code: Some(voucher.code.clone()),
                        amount: Some(cost),
                        message: "Congratulations, you won!".to_string(),
                    });
                    pending_tx.push(RewardTransaction {
                        id: 0,
                        user_id: user.id,
                        username: username.clone(),
                        game_id: req.game_id,
                        voucher_id: Some(voucher.id),
                        batch_id: req.batch_id.clone(),
                        status: TransactionStatus::Win,
                        amount: Some(cost),
                        reward_message: "Congratulations, you won!".to_string(),
                        created_at: now,
                    });
                }
                CandidateOutcome::Skipped => {
                    rewards.push(UserRewardResult::loss(username.clone()));
                    pending_tx.push(loss_transaction(req, user.id, username.clone(), now));
                }
            }

            self.after_user_hook_tick(idx, &mut game_snapshot);

            // f. early termination.
            if self.should_stop_early(spent, tick, remaining_at_start) {
                self.fill_remaining_loss(&shuffled, &users, idx + 1, &mut rewards, &mut pending_tx, req, now);
                break;
            }
        }

        // Step 7: budget commit.
        let actual_spend: Decimal = pending_tx
            .iter()
            .filter(|t| t.status == TransactionStatus::Win)
            .filter_map(|t| t.amount)
            .sum();

        let committed_spend = if actual_spend > remaining_at_start {
            error!(
                target: "engine.audit",
                batch_id = %req.batch_id,
                game_id = req.game_id,
                actual_spend = %actual_spend,
                remaining_budget = %remaining_at_start,
                "CRITICAL: measured spend exceeded remaining budget; clamping"
            );
            remaining_at_start
        } else {
            actual_spend
        };

        let mut updated_game = lock.clone();
        updated_game.remaining_budget -= committed_spend;

        // Step 8: status transition.
        if updated_game.remaining_budget <= Decimal::ZERO {
            updated_game.remaining_budget = Decimal::ZERO;
            updated_game.status = crate::model::GameStatus::BudgetExhausted;
        }

        self.store.save_game(&mut lock, updated_game).await?;

        // Step 9: persist transactions and assemble the result.
        for tx in pending_tx {
            self.store.insert_transaction(tx).await?;
        }

        Ok(BatchResult {
            batch_id: req.batch_id.clone(),
            processed_at: now,
            rewards,
            total_spent: committed_spend,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn after_user_hook_tick(&self, idx: usize, game_snapshot: &mut Game) {
        if let Some(hook) = &self.after_user_hook {
            hook(idx, game_snapshot);
        }
    }

    fn should_stop_early(&self, spent: Decimal, tick: Decimal, remaining_at_start: Decimal) -> bool {
        spent >= tick || spent >= remaining_at_start
    }

    /// Try to award `candidate` to the current user. Acquires the
    /// voucher's exclusive lock, re-verifies the predicate against the
    /// authoritative row, and decrements inventory on success.
    async fn try_award(
        &self,
        voucher_id: VoucherId,
        spent_so_far: Decimal,
        tick: Decimal,
        remaining_at_start: Decimal,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<(Voucher, Decimal)>> {
        let mut lock = match self.store.lock_voucher(voucher_id).await {
            Ok(l) => l,
            Err(EngineError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        if !lock.is_available(now) {
            return Ok(None);
        }
        let cost = lock.cost;
        if spent_so_far + cost > tick || spent_so_far + cost > remaining_at_start {
            return Ok(None);
        }

        let mut updated: Voucher = lock.clone();
        updated.current_quantity -= 1;
        self.store.save_voucher(&mut lock, updated.clone()).await?;

        Ok(Some((updated, cost)))
    }

    /// Fill a LOSS result/transaction for every username from `from`
    /// onward (inclusive), used by both the budget-exhaustion and
    /// game-deactivated early-termination paths. `users` must be
    /// resolved (same order, same length) against `usernames`.
    fn fill_remaining_loss(
        &self,
        usernames: &[String],
        users: &[crate::model::User],
        from: usize,
        rewards: &mut Vec<UserRewardResult>,
        pending_tx: &mut Vec<RewardTransaction>,
        req: &BatchRequest,
        now: DateTime<Utc>,
    ) {
        for (username, user) in usernames[from..].iter().zip(&users[from..]) {
            rewards.push(UserRewardResult::loss(username.clone()));
            pending_tx.push(loss_transaction(req, user.id, username.clone(), now));
        }
    }

    /// Synthesize an all-LOSS response for a game that is missing or
    /// not active-and-funded, persisting one LOSS transaction per
    /// username (spec.md 4.2 step 2/4 fallback).
    async fn all_loss(&self, req: &BatchRequest, total_spent: Decimal, start: std::time::Instant) -> EngineResult<BatchResult> {
        let now = req.timestamp.unwrap_or_else(|| self.clock.now());
        let mut rewards = Vec::with_capacity(req.usernames.len());

        for username in &req.usernames {
            let user = self.store.find_or_create_user(username).await?;
            rewards.push(UserRewardResult::loss(username.clone()));
            self.store
                .insert_transaction(loss_transaction(req, user.id, username.clone(), now))
                .await?;
        }

        Ok(BatchResult {
            batch_id: req.batch_id.clone(),
            processed_at: now,
            rewards,
            total_spent,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Idempotent replay: rebuild a `BatchResult` purely from persisted
    /// transactions, performing no further mutation (spec.md 4.2
    /// guarantee 1).
    async fn reconstruct_result(&self, req: &BatchRequest, start: std::time::Instant) -> EngineResult<BatchResult> {
        let txs = self.store.transactions_for_batch(&req.batch_id).await?;
        let total_spent: Decimal = txs
            .iter()
            .filter(|t| t.status == TransactionStatus::Win)
            .filter_map(|t| t.amount)
            .sum();

        let mut rewards = Vec::with_capacity(txs.len());
        for tx in &txs {
            let status = match tx.status {
                TransactionStatus::Win => RewardStatus::Win,
                _ => RewardStatus::Loss,
            };
            rewards.push(UserRewardResult {
                username: tx.username.clone(),
                status,
                voucher_id: tx.voucher_id,
                voucher_code: None,
                amount: tx.amount,
                message: tx.reward_message.clone(),
            });
        }

        Ok(BatchResult {
            batch_id: req.batch_id.clone(),
            processed_at: txs.first().map(|t| t.created_at).unwrap_or_else(|| self.clock.now()),
            rewards,
            total_spent,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

fn loss_transaction(
    req: &BatchRequest,
    user_id: crate::model::UserId,
    username: String,
    now: DateTime<Utc>,
) -> RewardTransaction {
    RewardTransaction {
        id: 0,
        user_id,
        username,
        game_id: req.game_id,
        voucher_id: None,
        batch_id: req.batch_id.clone(),
        status: TransactionStatus::Loss,
        amount: None,
        reward_message: BETTER_LUCK_NEXT_TIME.to_string(),
        created_at: now,
    }
}
