// 8.0 engine/core.rs: main engine. one long lived instance shared as Arc<Engine>.
// owns the quote cache, the active position cache, the per agent lock registry and
// the pnl write throttle. durable state lives in the store.

use super::cache::ActivePositionCache;
use super::config::EngineConfig;
use super::results::EngineError;
use crate::clock::{Clock, SystemClock};
use crate::order::Order;
use crate::position::Position;
use crate::quote::{Candle, MarketQuote, QuoteCache, QuoteUpdate};
use crate::store::{RecordStore, StoreError};
use crate::throttle::Throttle;
use crate::types::{round_money, AgentId, OrderId, PositionId, Symbol, Timestamp};
use crate::wallet::{Wallet, WalletView};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OnceCell, OwnedMutexGuard};
use tracing::info;

/** 8.1: main engine struct */
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) store: Arc<dyn RecordStore>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) quotes: QuoteCache,
    pub(super) positions: ActivePositionCache,
    pub(super) hydrated: OnceCell<()>,
    pub(super) agent_locks: Mutex<HashMap<AgentId, Arc<AsyncMutex<()>>>>,
    pub(super) pnl_writes: Throttle<PositionId>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("quotes", &self.quotes.len())
            .field("active_positions", &self.positions.len())
            .field("hydrated", &self.hydrated.initialized())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(config: EngineConfig, store: Arc<dyn RecordStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            quotes: QuoteCache::new(config.recent_trade_ring),
            pnl_writes: Throttle::new(config.pnl_persist_interval_ms),
            config,
            store,
            clock,
            positions: ActivePositionCache::default(),
            hydrated: OnceCell::new(),
            agent_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Merges a partial quote into the cache. Does not tick.
    pub fn update_quote(&self, symbol: &Symbol, update: QuoteUpdate) {
        self.quotes.update(symbol, update, self.now());
    }

    /// 8.2: loads active positions once per engine lifetime. A failed load leaves the
    /// cell empty, so the next caller retries.
    pub async fn ensure_hydrated(&self) -> Result<(), EngineError> {
        self.hydrated
            .get_or_try_init(|| async {
                let active = self.store.active_positions().await?;
                let count = active.len();
                self.positions.load(active);
                info!(active_positions = count, "position cache hydrated");
                Ok::<(), EngineError>(())
            })
            .await?;
        Ok(())
    }

    /// Active positions currently cached for `symbol`.
    pub fn cached_positions(&self, symbol: &Symbol) -> Vec<Position> {
        self.positions.snapshot(symbol)
    }

    // 8.3: every mutation for one agent runs under that agent's lock
    pub(super) async fn lock_agent(&self, agent_id: &AgentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.agent_locks.lock();
            locks.entry(agent_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub async fn open_wallet(&self, agent_id: &AgentId) -> Result<Wallet, EngineError> {
        let _guard = self.lock_agent(agent_id).await;
        let wallet = Wallet::new(agent_id.clone(), self.config.starting_balance, self.now());

        match self.store.insert_wallet(wallet.clone()).await {
            Ok(()) => {
                info!(agent = %agent_id, balance = %wallet.balance, "wallet opened");
                Ok(wallet)
            }
            Err(StoreError::Duplicate { .. }) => Err(EngineError::WalletExists(agent_id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn wallet(&self, agent_id: &AgentId) -> Result<WalletView, EngineError> {
        let wallet = self.load_wallet(agent_id).await?;
        let positions = self.store.active_positions_for_agent(agent_id).await?;
        let unrealized: Decimal = positions.iter().map(|p| p.pnl_at(self.live_price(p))).sum();
        Ok(WalletView::new(&wallet, unrealized))
    }

    pub async fn order(&self, agent_id: &AgentId, id: OrderId) -> Result<Order, EngineError> {
        match self.store.order(id).await? {
            Some(order) if &order.agent_id == agent_id => Ok(order),
            _ => Err(EngineError::OrderNotFound(id)),
        }
    }

    pub async fn positions(&self, agent_id: &AgentId) -> Result<Vec<Position>, EngineError> {
        Ok(self.store.active_positions_for_agent(agent_id).await?)
    }

    pub fn quote(&self, symbol: &Symbol) -> Option<MarketQuote> {
        self.quotes.get(symbol)
    }

    pub fn quotes(&self) -> Vec<MarketQuote> {
        self.quotes.get_all()
    }

    pub fn candle(&self, symbol: &Symbol) -> Option<Candle> {
        self.quotes.get(symbol).map(|q| q.candle())
    }

    pub(super) async fn load_wallet(&self, agent_id: &AgentId) -> Result<Wallet, EngineError> {
        self.store
            .wallet(agent_id)
            .await?
            .ok_or_else(|| EngineError::WalletNotFound(agent_id.clone()))
    }

    // latest last price, or the position's own mark when the feed has nothing
    pub(super) fn live_price(&self, position: &Position) -> Decimal {
        self.quotes
            .get(&position.symbol)
            .filter(MarketQuote::has_last)
            .map(|q| q.last)
            .unwrap_or_else(|| round_money(position.mark_price))
    }
}
