//! Administrative surface: brand and voucher provisioning, and game
//! creation (spec.md §4.6). Mirrors the shape of blendizzard's
//! `lib.rs` admin section — guard-clause validation up front, a single
//! store mutation per concern, nothing transactional spanning multiple
//! rows except game creation's brand debits.

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::model::{Brand, BrandId, Game, GameBrandLink, GameStatus, Voucher, VoucherId};
use crate::store::Store;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

pub struct AdminSurface<St: Store> {
    store: Arc<St>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl<St: Store> AdminSurface<St> {
    pub fn new(store: Arc<St>, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self { store, clock, config }
    }

    pub async fn create_brand(&self, name: String, daily_spend_limit: Decimal) -> EngineResult<Brand> {
        if name.trim().is_empty() {
            return Err(EngineError::InvalidRequest("brand name must not be empty".into()));
        }
        let brand = Brand {
            id: 0,
            name,
            wallet_balance: Decimal::ZERO,
            daily_spend_limit,
            is_active: true,
        };
        self.store.create_brand(brand).await
    }

    pub async fn deposit(&self, brand_id: BrandId, amount: Decimal) -> EngineResult<Brand> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::InvalidRequest("deposit amount must be positive".into()));
        }
        self.store.deposit_to_brand(brand_id, amount).await
    }

    /// Create a voucher, after checking the brand's wallet can cover
    /// the full inventory cost (`cost * quantity`). This is a
    /// provisioning check only: no funds move here, game creation is
    /// what actually debits the brand for the budget it contributes.
    pub async fn create_voucher(
        &self,
        brand_id: BrandId,
        code: String,
        description: String,
        cost: Decimal,
        initial_quantity: i64,
        expiry_at: Option<DateTime<Utc>>,
    ) -> EngineResult<Voucher> {
        if cost <= Decimal::ZERO {
            return Err(EngineError::InvalidRequest("voucher cost must be positive".into()));
        }
        if initial_quantity <= 0 {
            return Err(EngineError::InvalidRequest("voucher quantity must be positive".into()));
        }

        let brand = self
            .store
            .find_brand(brand_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("brand {brand_id}")))?;
        if !brand.is_active {
            return Err(EngineError::StateInvalid(format!("brand {brand_id} is not active")));
        }

        let total_cost = cost * Decimal::from(initial_quantity);
        if total_cost > brand.wallet_balance {
            return Err(EngineError::InsufficientFunds(format!(
                "brand {brand_id} wallet {} cannot cover voucher inventory cost {total_cost}",
                brand.wallet_balance
            )));
        }

        let voucher = Voucher {
            id: 0,
            code,
            brand_id,
            description,
            cost,
            initial_quantity,
            current_quantity: initial_quantity,
            expiry_at,
            is_active: true,
            version: 0,
        };
        self.store.create_voucher(voucher).await
    }

    pub async fn restock_voucher(&self, id: VoucherId, additional: i64) -> EngineResult<Voucher> {
        if additional <= 0 {
            return Err(EngineError::InvalidRequest("restock quantity must be positive".into()));
        }
        self.store.restock_voucher(id, additional).await
    }

    pub async fn deactivate_voucher(&self, id: VoucherId) -> EngineResult<Voucher> {
        self.store.deactivate_voucher(id).await
    }

    /// Create a game funded by one or more brand contributions. Each
    /// contribution is debited from its brand's wallet and recorded as
    /// a locked [`GameBrandLink`]; `total_budget`/`remaining_budget`
    /// start equal to the sum of contributions.
    ///
    /// Every contributing brand's wallet is checked against the full
    /// sum it owes *before* any brand is debited, so a shortfall on
    /// brand N never leaves brands 1..N-1 debited for a game that is
    /// never created.
    pub async fn create_game(
        &self,
        game_code: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        win_probability: Option<Decimal>,
        volatility_factor: Option<Decimal>,
        contributions: Vec<(BrandId, Decimal)>,
    ) -> EngineResult<Game> {
        if end_time <= start_time {
            return Err(EngineError::InvalidRequest("endTime must be after startTime".into()));
        }
        if contributions.is_empty() {
            return Err(EngineError::InvalidRequest("a game needs at least one brand contribution".into()));
        }
        for (_, amount) in &contributions {
            if *amount <= Decimal::ZERO {
                return Err(EngineError::InvalidRequest("contribution amount must be positive".into()));
            }
        }

        let mut owed: HashMap<BrandId, Decimal> = HashMap::new();
        for (brand_id, amount) in &contributions {
            *owed.entry(*brand_id).or_insert(Decimal::ZERO) += *amount;
        }
        for (brand_id, total_owed) in &owed {
            let brand = self
                .store
                .find_brand(*brand_id)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("brand {brand_id}")))?;
            if !brand.is_active {
                return Err(EngineError::StateInvalid(format!("brand {brand_id} is not active")));
            }
            if *total_owed > brand.wallet_balance {
                return Err(EngineError::InsufficientFunds(format!(
                    "brand {brand_id} wallet {} cannot cover total contribution {total_owed}",
                    brand.wallet_balance
                )));
            }
        }

        let mut links = Vec::with_capacity(contributions.len());
        let mut total_budget = Decimal::ZERO;

        for (brand_id, amount) in contributions {
            self.store.debit_brand(brand_id, amount).await?;
            links.push(GameBrandLink {
                game_id: 0,
                brand_id,
                contribution_amount: amount,
                is_locked: true,
            });
            total_budget += amount;
        }

        let now = self.clock.now();
        let status = if start_time <= now { GameStatus::Active } else { GameStatus::Scheduled };

        let game = Game {
            id: 0,
            game_code,
            start_time,
            end_time,
            total_budget,
            remaining_budget: total_budget,
            status,
            win_probability: win_probability.unwrap_or(self.config.default_win_probability),
            volatility_factor: volatility_factor.unwrap_or(self.config.default_volatility_factor),
            version: 0,
        };

        self.store.create_game(game, links).await
    }
}
