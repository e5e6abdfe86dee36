//! Reference in-memory [`Store`] implementation.
//!
//! Exclusive row locks are modeled with one `tokio::sync::Mutex` per
//! row, handed out as an owned guard so the lock survives across
//! `.await` points inside the batch processor exactly like a real
//! database row lock would. Optimistic versioning is checked explicitly
//! on `save_game`/`save_voucher` even though the in-memory mutex alone
//! already serializes writers, so the contract matches what a
//! row-locking-plus-versioning SQL engine would require.

use super::{GameLock, Store, VoucherLock};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    Brand, BrandId, Game, GameBrandLink, GameId, GameStatus, RewardTransaction, User, UserId, Voucher, VoucherId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
pub struct InMemoryStore {
    games: RwLock<HashMap<GameId, Arc<Mutex<Game>>>>,
    game_links: RwLock<HashMap<GameId, Vec<GameBrandLink>>>,
    vouchers: RwLock<HashMap<VoucherId, Arc<Mutex<Voucher>>>>,
    brands: RwLock<HashMap<BrandId, Brand>>,
    users: RwLock<HashMap<String, User>>,
    transactions_by_batch: RwLock<HashMap<String, Vec<RewardTransaction>>>,

    next_game_id: AtomicI64,
    next_voucher_id: AtomicI64,
    next_brand_id: AtomicI64,
    next_user_id: AtomicI64,
    next_tx_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/seed helper: insert a game directly, bypassing brand-wallet
    /// bookkeeping. Production seeding goes through `create_game`.
    pub async fn seed_game(&self, game: Game) {
        let id = game.id;
        self.games.write().await.insert(id, Arc::new(Mutex::new(game)));
    }

    pub async fn seed_voucher(&self, voucher: Voucher) {
        let id = voucher.id;
        self.vouchers.write().await.insert(id, Arc::new(Mutex::new(voucher)));
    }

    pub async fn seed_brand(&self, brand: Brand) {
        let id = brand.id;
        self.brands.write().await.insert(id, brand);
    }

    pub async fn seed_game_brand_link(&self, link: GameBrandLink) {
        self.game_links.write().await.entry(link.game_id).or_default().push(link);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_game(&self, id: GameId) -> EngineResult<Option<Game>> {
        let map = self.games.read().await;
        match map.get(&id) {
            Some(arc) => Ok(Some(arc.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn lock_game(&self, id: GameId) -> EngineResult<GameLock> {
        let arc = {
            let map = self.games.read().await;
            map.get(&id).cloned()
        }
        .ok_or_else(|| EngineError::NotFound(format!("game {id}")))?;

        let guard = arc.lock_owned().await;
        Ok(GameLock { guard })
    }

    async fn save_game(&self, lock: &mut GameLock, updated: Game) -> EngineResult<()> {
        if updated.version != lock.guard.version {
            return Err(EngineError::ConflictRetryable(format!(
                "game {} version mismatch: expected {}, got {}",
                updated.id, lock.guard.version, updated.version
            )));
        }
        let mut updated = updated;
        updated.version += 1;
        *lock.guard = updated;
        Ok(())
    }

    async fn create_game(&self, mut game: Game, links: Vec<GameBrandLink>) -> EngineResult<Game> {
        if game.id == 0 {
            game.id = self.next_game_id.fetch_add(1, Ordering::SeqCst) + 1;
        }
        let id = game.id;
        self.games.write().await.insert(id, Arc::new(Mutex::new(game.clone())));
        self.game_links.write().await.insert(id, links);
        Ok(game)
    }

    async fn find_game_brand_links(&self, game_id: GameId) -> EngineResult<Vec<GameBrandLink>> {
        Ok(self.game_links.read().await.get(&game_id).cloned().unwrap_or_default())
    }

    async fn games_due_to_activate(&self, now: DateTime<Utc>) -> EngineResult<Vec<GameId>> {
        let map = self.games.read().await;
        let mut out = Vec::new();
        for (id, arc) in map.iter() {
            let g = arc.lock().await;
            if g.status == GameStatus::Scheduled && g.start_time <= now {
                out.push(*id);
            }
        }
        Ok(out)
    }

    async fn games_due_to_complete(&self, now: DateTime<Utc>) -> EngineResult<Vec<GameId>> {
        let map = self.games.read().await;
        let mut out = Vec::new();
        for (id, arc) in map.iter() {
            let g = arc.lock().await;
            if g.status == GameStatus::Active && g.end_time <= now {
                out.push(*id);
            }
        }
        Ok(out)
    }

    async fn activate_game(&self, id: GameId) -> EngineResult<()> {
        let arc = {
            let map = self.games.read().await;
            map.get(&id).cloned()
        }
        .ok_or_else(|| EngineError::NotFound(format!("game {id}")))?;
        let mut g = arc.lock().await;
        g.status = GameStatus::Active;
        g.version += 1;
        Ok(())
    }

    async fn complete_game(&self, id: GameId) -> EngineResult<()> {
        let arc = {
            let map = self.games.read().await;
            map.get(&id).cloned()
        }
        .ok_or_else(|| EngineError::NotFound(format!("game {id}")))?;
        let mut g = arc.lock().await;
        g.status = GameStatus::Completed;
        g.version += 1;
        Ok(())
    }

    async fn find_candidate_vouchers(
        &self,
        game_id: GameId,
        max_cost: Decimal,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<Voucher>> {
        let links = self.game_links.read().await.get(&game_id).cloned().unwrap_or_default();
        let brand_ids: std::collections::HashSet<BrandId> = links.into_iter().map(|l| l.brand_id).collect();

        let map = self.vouchers.read().await;
        let mut out = Vec::new();
        for arc in map.values() {
            let v = arc.lock().await;
            if brand_ids.contains(&v.brand_id) && v.is_available(now) && v.cost <= max_cost {
                out.push(v.clone());
            }
        }
        Ok(out)
    }

    async fn lock_voucher(&self, id: VoucherId) -> EngineResult<VoucherLock> {
        let arc = {
            let map = self.vouchers.read().await;
            map.get(&id).cloned()
        }
        .ok_or_else(|| EngineError::NotFound(format!("voucher {id}")))?;
        let guard = arc.lock_owned().await;
        Ok(VoucherLock { guard })
    }

    async fn save_voucher(&self, lock: &mut VoucherLock, updated: Voucher) -> EngineResult<()> {
        if updated.version != lock.guard.version {
            return Err(EngineError::ConflictRetryable(format!(
                "voucher {} version mismatch: expected {}, got {}",
                updated.id, lock.guard.version, updated.version
            )));
        }
        let mut updated = updated;
        updated.version += 1;
        *lock.guard = updated;
        Ok(())
    }

    async fn create_voucher(&self, mut voucher: Voucher) -> EngineResult<Voucher> {
        if voucher.id == 0 {
            voucher.id = self.next_voucher_id.fetch_add(1, Ordering::SeqCst) + 1;
        }
        let id = voucher.id;
        self.vouchers.write().await.insert(id, Arc::new(Mutex::new(voucher.clone())));
        Ok(voucher)
    }

    async fn find_voucher(&self, id: VoucherId) -> EngineResult<Option<Voucher>> {
        let map = self.vouchers.read().await;
        match map.get(&id) {
            Some(arc) => Ok(Some(arc.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn restock_voucher(&self, id: VoucherId, additional: i64) -> EngineResult<Voucher> {
        let arc = {
            let map = self.vouchers.read().await;
            map.get(&id).cloned()
        }
        .ok_or_else(|| EngineError::NotFound(format!("voucher {id}")))?;
        let mut v = arc.lock().await;
        v.initial_quantity += additional;
        v.current_quantity += additional;
        v.version += 1;
        Ok(v.clone())
    }

    async fn deactivate_voucher(&self, id: VoucherId) -> EngineResult<Voucher> {
        let arc = {
            let map = self.vouchers.read().await;
            map.get(&id).cloned()
        }
        .ok_or_else(|| EngineError::NotFound(format!("voucher {id}")))?;
        let mut v = arc.lock().await;
        v.is_active = false;
        v.version += 1;
        Ok(v.clone())
    }

    async fn find_brand(&self, id: BrandId) -> EngineResult<Option<Brand>> {
        Ok(self.brands.read().await.get(&id).cloned())
    }

    async fn create_brand(&self, mut brand: Brand) -> EngineResult<Brand> {
        if brand.id == 0 {
            brand.id = self.next_brand_id.fetch_add(1, Ordering::SeqCst) + 1;
        }
        self.brands.write().await.insert(brand.id, brand.clone());
        Ok(brand)
    }

    async fn deposit_to_brand(&self, id: BrandId, amount: Decimal) -> EngineResult<Brand> {
        let mut map = self.brands.write().await;
        let brand = map.get_mut(&id).ok_or_else(|| EngineError::NotFound(format!("brand {id}")))?;
        brand.wallet_balance += amount;
        Ok(brand.clone())
    }

    async fn debit_brand(&self, id: BrandId, amount: Decimal) -> EngineResult<Brand> {
        let mut map = self.brands.write().await;
        let brand = map.get_mut(&id).ok_or_else(|| EngineError::NotFound(format!("brand {id}")))?;
        if brand.wallet_balance < amount {
            return Err(EngineError::InsufficientFunds(format!(
                "brand {id} wallet {} cannot cover contribution {amount}",
                brand.wallet_balance
            )));
        }
        brand.wallet_balance -= amount;
        Ok(brand.clone())
    }

    async fn find_or_create_user(&self, username: &str) -> EngineResult<User> {
        {
            let map = self.users.read().await;
            if let Some(u) = map.get(username) {
                return Ok(u.clone());
            }
        }
        let mut map = self.users.write().await;
        if let Some(u) = map.get(username) {
            return Ok(u.clone());
        }
        let user = User {
            id: self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1,
            username: username.to_string(),
            email: None,
            full_name: None,
            is_active: true,
            last_played_at: None,
        };
        map.insert(username.to_string(), user.clone());
        Ok(user)
    }

    async fn touch_user_last_played(&self, user_id: UserId, at: DateTime<Utc>) -> EngineResult<()> {
        let mut map = self.users.write().await;
        for u in map.values_mut() {
            if u.id == user_id {
                u.last_played_at = Some(at);
                break;
            }
        }
        Ok(())
    }

    async fn exists_batch(&self, batch_id: &str) -> EngineResult<bool> {
        Ok(self.transactions_by_batch.read().await.contains_key(batch_id))
    }

    async fn transactions_for_batch(&self, batch_id: &str) -> EngineResult<Vec<RewardTransaction>> {
        Ok(self
            .transactions_by_batch
            .read()
            .await
            .get(batch_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_transaction(&self, mut tx: RewardTransaction) -> EngineResult<RewardTransaction> {
        if tx.id == 0 {
            tx.id = self.next_tx_id.fetch_add(1, Ordering::SeqCst) + 1;
        }
        let mut map = self.transactions_by_batch.write().await;
        map.entry(tx.batch_id.clone()).or_default().push(tx.clone());
        Ok(tx)
    }
}
