//! Game lifecycle sweeper: the periodic task that moves games through
//! SCHEDULED -> ACTIVE -> COMPLETED on wall-clock time alone (spec.md
//! §4.5). Each transition is a single-row update with no cross-row
//! escalation, the same scope blendizzard's `epoch.rs` non-fatal
//! per-item loop uses — one game failing to transition never blocks
//! the rest.

use crate::clock::Clock;
use crate::config::Config;
use crate::error::EngineResult;
use crate::store::Store;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct LifecycleSweeper<St: Store> {
    store: Arc<St>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl<St: Store + 'static> LifecycleSweeper<St> {
    pub fn new(store: Arc<St>, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self { store, clock, config }
    }

    /// Run one sweep pass. Exposed directly so tests can drive the
    /// sweeper without waiting on the interval.
    pub async fn sweep_once(&self) -> EngineResult<()> {
        let now = self.clock.now();

        for game_id in self.store.games_due_to_activate(now).await? {
            match self.store.activate_game(game_id).await {
                Ok(()) => info!(game_id, "game activated"),
                Err(e) => warn!(game_id, error = %e, "failed to activate game"),
            }
        }

        for game_id in self.store.games_due_to_complete(now).await? {
            match self.store.complete_game(game_id).await {
                Ok(()) => info!(game_id, "game completed"),
                Err(e) => warn!(game_id, error = %e, "failed to complete game"),
            }
        }

        Ok(())
    }

    pub fn spawn_loop(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.config.sweeper_interval();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = self.sweep_once().await {
                    warn!(error = %e, "lifecycle sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::{Game, GameStatus};
    use crate::store::memory::InMemoryStore;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn activates_and_completes_due_games() {
        let now = Utc::now();
        let store = Arc::new(InMemoryStore::new());

        store
            .seed_game(Game {
                id: 1,
                game_code: "SCHED".into(),
                start_time: now - Duration::seconds(1),
                end_time: now + Duration::hours(1),
                total_budget: dec!(100.00),
                remaining_budget: dec!(100.00),
                status: GameStatus::Scheduled,
                win_probability: dec!(0.1),
                volatility_factor: dec!(1.0),
                version: 0,
            })
            .await;

        store
            .seed_game(Game {
                id: 2,
                game_code: "DONE".into(),
                start_time: now - Duration::hours(1),
                end_time: now - Duration::seconds(1),
                total_budget: dec!(100.00),
                remaining_budget: dec!(50.00),
                status: GameStatus::Active,
                win_probability: dec!(0.1),
                volatility_factor: dec!(1.0),
                version: 0,
            })
            .await;

        let clock = Arc::new(FixedClock::new(now));
        let sweeper = LifecycleSweeper::new(store.clone(), clock, Config::default());
        sweeper.sweep_once().await.unwrap();

        let g1 = store.find_game(1).await.unwrap().unwrap();
        assert_eq!(g1.status, GameStatus::Active);
        let g2 = store.find_game(2).await.unwrap().unwrap();
        assert_eq!(g2.status, GameStatus::Completed);
    }
}
