//! Durable record store boundary.
//!
//! The engine owns no durable state. Wallets, orders, positions and the append only
//! history live behind [`RecordStore`]. Single row reads and writes are plain calls;
//! anything that moves money goes through [`RecordStore::commit`], which applies a
//! [`WriteBatch`] all at once or not at all.

mod memory;

pub use memory::MemoryStore;

use crate::ledger::{LedgerEntry, Trade};
use crate::order::{Order, OrderStatus};
use crate::position::{Position, PositionStatus};
use crate::types::{AgentId, OrderId, PositionId, Symbol, Timestamp};
use crate::wallet::Wallet;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Last known prices for one symbol, written on a throttle by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: Symbol,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub mark_price: Decimal,
    pub updated_at: Timestamp,
}

/// One write inside a batch. Variants carrying `expected` are guarded: the batch
/// fails with [`StoreError::Conflict`] unless the stored row has that status.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Guarded on there being no other active position for the same agent and symbol.
    InsertPosition(Position),
    UpdatePosition { position: Position, expected: PositionStatus },
    PutWallet(Wallet),
    DeleteOrder { id: OrderId, expected: OrderStatus },
    InsertTrade(Trade),
    AppendLedger(LedgerEntry),
}

/// Ordered list of writes. Later writes see the effects of earlier ones, so a
/// close followed by an insert for the same symbol is a valid flip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} changed underneath the write")]
    Conflict { entity: &'static str, id: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} already exists")]
    Duplicate { entity: &'static str, id: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    // wallets
    async fn insert_wallet(&self, wallet: Wallet) -> Result<(), StoreError>;
    async fn wallet(&self, agent_id: &AgentId) -> Result<Option<Wallet>, StoreError>;

    // orders
    async fn next_order_id(&self) -> Result<OrderId, StoreError>;
    async fn insert_order(&self, order: Order) -> Result<(), StoreError>;
    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;
    async fn open_limit_orders(&self, symbol: &Symbol) -> Result<Vec<Order>, StoreError>;
    async fn open_orders_for_agent(&self, agent_id: &AgentId) -> Result<Vec<Order>, StoreError>;

    /// Moves an order owned by `agent_id` from `expected` to `next`. Returns the
    /// updated order, or `None` when the order is missing, owned by someone else or
    /// no longer in `expected`.
    async fn transition_order(
        &self,
        id: OrderId,
        agent_id: &AgentId,
        expected: OrderStatus,
        next: OrderStatus,
        timestamp: Timestamp,
    ) -> Result<Option<Order>, StoreError>;

    // positions
    async fn next_position_id(&self) -> Result<PositionId, StoreError>;
    async fn active_positions(&self) -> Result<Vec<Position>, StoreError>;
    async fn active_position(&self, agent_id: &AgentId, symbol: &Symbol) -> Result<Option<Position>, StoreError>;
    async fn active_positions_for_agent(&self, agent_id: &AgentId) -> Result<Vec<Position>, StoreError>;
    async fn position(&self, id: PositionId) -> Result<Option<Position>, StoreError>;

    /// Refreshes the mark fields of an active position. Returns false once closed.
    async fn update_position_marks(
        &self,
        id: PositionId,
        mark_price: Decimal,
        unrealized_pnl: Decimal,
        timestamp: Timestamp,
    ) -> Result<bool, StoreError>;

    // history
    /// Newest first. `limit` of `None` returns everything.
    async fn trades_for_agent(&self, agent_id: &AgentId, limit: Option<usize>) -> Result<Vec<Trade>, StoreError>;
    async fn ledger_for_agent(&self, agent_id: &AgentId) -> Result<Vec<LedgerEntry>, StoreError>;

    // prices
    async fn upsert_price_snapshot(&self, snapshot: PriceSnapshot) -> Result<(), StoreError>;
    async fn price_snapshot(&self, symbol: &Symbol) -> Result<Option<PriceSnapshot>, StoreError>;

    /// Applies every write in order, or none of them.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}
