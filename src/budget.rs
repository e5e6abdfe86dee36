//! The tick-budget pure function (spec.md §4.1).
//!
//! `tick_budget` is the only place the engine decides how much money a
//! single batch may authorize. It has no side effects and takes its
//! notion of "now" as a plain argument, so it is exhaustively unit
//! tested without a [`crate::clock::Clock`] in sight.

use crate::model::{Game, GameStatus};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Default money scale (spec.md `moneyScale = 2`), used by callers that
/// don't have a [`crate::config::Config`] at hand (unit tests below).
/// Production call sites pass `config.money_scale` through explicitly so
/// the configured scale actually governs rounding.
pub const MONEY_SCALE: u32 = 2;

fn round_half_up(amount: Decimal, scale: u32) -> Decimal {
    amount.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute `B_tick` for `game` at wall time `now`, rounding at `scale`
/// decimal places (`Config::money_scale`).
///
/// ```text
/// if status != ACTIVE or remainingBudget <= 0 or now >= endTime: 0
/// elif floor(seconds_until(now, endTime)) <= 0: remainingBudget
/// else:
///     per_second = remainingBudget / floor(seconds_until(now, endTime))
///     B_tick = min(per_second * volatilityFactor, remainingBudget)
/// ```
///
/// The result is never negative and never exceeds `remaining_budget`.
pub fn tick_budget(game: &Game, now: DateTime<Utc>, scale: u32) -> Decimal {
    if game.status != GameStatus::Active || game.remaining_budget <= Decimal::ZERO || now >= game.end_time {
        return Decimal::ZERO;
    }

    let seconds_until = (game.end_time - now).num_seconds();
    if seconds_until <= 0 {
        return round_half_up(game.remaining_budget, scale);
    }

    let seconds = Decimal::from(seconds_until);
    let per_second = divide_half_up(game.remaining_budget, seconds, scale);
    let raw = round_half_up(per_second * game.volatility_factor, scale);

    raw.min(game.remaining_budget)
}

/// Decimal division rounded HALF_UP at `scale`. `rust_decimal` division
/// is exact-as-possible internally; we round explicitly at the scale
/// the spec mandates rather than relying on the crate's default
/// rounding, since the default is banker's rounding (round-half-even).
fn divide_half_up(numerator: Decimal, denominator: Decimal, scale: u32) -> Decimal {
    debug_assert!(denominator != Decimal::ZERO, "seconds_until must be > 0 here");
    round_half_up(numerator / denominator, scale)
}

/// Floor to whole seconds between `now` and `end_time`, never negative.
/// Exposed for callers that need the same "seconds remaining" notion the
/// budget model uses (e.g. logging, diagnostics).
pub fn seconds_until(now: DateTime<Utc>, end_time: DateTime<Utc>) -> i64 {
    (end_time - now).num_seconds().max(0)
}

/// Convert a `Decimal` tick budget into an `f64` strictly for test
/// assertions that want approximate comparisons; never used on the hot
/// path.
#[cfg(test)]
fn to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap()
}
