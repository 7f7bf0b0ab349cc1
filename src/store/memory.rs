// 6.1: in process store. one mutex over every table so a batch is trivially atomic:
// writes are staged against a copy of the rows and swapped in only when every
// guard held. used by the simulator and all of the tests.

use super::{PriceSnapshot, RecordStore, StoreError, Write, WriteBatch};
use crate::ledger::{LedgerEntry, Trade};
use crate::order::{Order, OrderStatus, OrderType};
use crate::position::Position;
use crate::types::{AgentId, OrderId, PositionId, Symbol, Timestamp};
use crate::wallet::Wallet;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Default, Clone)]
struct Rows {
    wallets: HashMap<AgentId, Wallet>,
    orders: BTreeMap<OrderId, Order>,
    positions: BTreeMap<PositionId, Position>,
}

impl Rows {
    fn active_for(&self, agent_id: &AgentId, symbol: &Symbol) -> Option<&Position> {
        self.positions
            .values()
            .find(|p| p.is_active() && &p.agent_id == agent_id && &p.symbol == symbol)
    }
}

#[derive(Debug, Default)]
struct Tables {
    rows: Rows,
    trades: Vec<Trade>,
    ledger: Vec<LedgerEntry>,
    prices: HashMap<Symbol, PriceSnapshot>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    order_seq: AtomicU64,
    position_seq: AtomicU64,
    fail_next_commit: AtomicBool,
    commits: AtomicU64,
}

fn conflict(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::Conflict {
        entity,
        id: id.to_string(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `commit` fail with `Unavailable` without applying anything.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of batches applied so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn all_trades(&self) -> Vec<Trade> {
        self.tables.lock().trades.clone()
    }

    pub fn all_positions(&self) -> Vec<Position> {
        self.tables.lock().rows.positions.values().cloned().collect()
    }

    fn apply(rows: &mut Rows, write: Write, trades: &mut Vec<Trade>, ledger: &mut Vec<LedgerEntry>) -> Result<(), StoreError> {
        match write {
            Write::InsertPosition(position) => {
                if rows.positions.contains_key(&position.id) {
                    return Err(conflict("position", position.id));
                }
                if let Some(existing) = rows.active_for(&position.agent_id, &position.symbol) {
                    return Err(conflict("position", existing.id));
                }
                rows.positions.insert(position.id, position);
            }
            Write::UpdatePosition { position, expected } => match rows.positions.get(&position.id) {
                Some(current) if current.status == expected => {
                    rows.positions.insert(position.id, position);
                }
                _ => return Err(conflict("position", position.id)),
            },
            Write::PutWallet(wallet) => {
                rows.wallets.insert(wallet.agent_id.clone(), wallet);
            }
            Write::DeleteOrder { id, expected } => match rows.orders.get(&id) {
                Some(order) if order.status == expected => {
                    rows.orders.remove(&id);
                }
                _ => return Err(conflict("order", id)),
            },
            Write::InsertTrade(trade) => trades.push(trade),
            Write::AppendLedger(entry) => ledger.push(entry),
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_wallet(&self, wallet: Wallet) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if tables.rows.wallets.contains_key(&wallet.agent_id) {
            return Err(StoreError::Duplicate {
                entity: "wallet",
                id: wallet.agent_id.to_string(),
            });
        }
        tables.rows.wallets.insert(wallet.agent_id.clone(), wallet);
        Ok(())
    }

    async fn wallet(&self, agent_id: &AgentId) -> Result<Option<Wallet>, StoreError> {
        Ok(self.tables.lock().rows.wallets.get(agent_id).cloned())
    }

    async fn next_order_id(&self) -> Result<OrderId, StoreError> {
        Ok(OrderId(self.order_seq.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        if tables.rows.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate {
                entity: "order",
                id: order.id.to_string(),
            });
        }
        tables.rows.orders.insert(order.id, order);
        Ok(())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.tables.lock().rows.orders.get(&id).cloned())
    }

    async fn open_limit_orders(&self, symbol: &Symbol) -> Result<Vec<Order>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .rows
            .orders
            .values()
            .filter(|o| o.is_open() && o.order_type == OrderType::Limit && &o.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn open_orders_for_agent(&self, agent_id: &AgentId) -> Result<Vec<Order>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .rows
            .orders
            .values()
            .filter(|o| o.is_open() && &o.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn transition_order(
        &self,
        id: OrderId,
        agent_id: &AgentId,
        expected: OrderStatus,
        next: OrderStatus,
        timestamp: Timestamp,
    ) -> Result<Option<Order>, StoreError> {
        let mut tables = self.tables.lock();
        match tables.rows.orders.get_mut(&id) {
            Some(order) if &order.agent_id == agent_id && order.status == expected => {
                order.status = next;
                order.updated_at = timestamp;
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn next_position_id(&self) -> Result<PositionId, StoreError> {
        Ok(PositionId(self.position_seq.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn active_positions(&self) -> Result<Vec<Position>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables.rows.positions.values().filter(|p| p.is_active()).cloned().collect())
    }

    async fn active_position(&self, agent_id: &AgentId, symbol: &Symbol) -> Result<Option<Position>, StoreError> {
        Ok(self.tables.lock().rows.active_for(agent_id, symbol).cloned())
    }

    async fn active_positions_for_agent(&self, agent_id: &AgentId) -> Result<Vec<Position>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .rows
            .positions
            .values()
            .filter(|p| p.is_active() && &p.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn position(&self, id: PositionId) -> Result<Option<Position>, StoreError> {
        Ok(self.tables.lock().rows.positions.get(&id).cloned())
    }

    async fn update_position_marks(
        &self,
        id: PositionId,
        mark_price: Decimal,
        unrealized_pnl: Decimal,
        timestamp: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        match tables.rows.positions.get_mut(&id) {
            Some(position) if position.is_active() => {
                position.mark_price = mark_price;
                position.unrealized_pnl = unrealized_pnl;
                position.updated_at = timestamp;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn trades_for_agent(&self, agent_id: &AgentId, limit: Option<usize>) -> Result<Vec<Trade>, StoreError> {
        let tables = self.tables.lock();
        let newest_first = tables.trades.iter().rev().filter(|t| &t.agent_id == agent_id).cloned();
        Ok(match limit {
            Some(limit) => newest_first.take(limit).collect(),
            None => newest_first.collect(),
        })
    }

    async fn ledger_for_agent(&self, agent_id: &AgentId) -> Result<Vec<LedgerEntry>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables.ledger.iter().filter(|e| &e.agent_id == agent_id).cloned().collect())
    }

    async fn upsert_price_snapshot(&self, snapshot: PriceSnapshot) -> Result<(), StoreError> {
        self.tables.lock().prices.insert(snapshot.symbol.clone(), snapshot);
        Ok(())
    }

    async fn price_snapshot(&self, symbol: &Symbol) -> Result<Option<PriceSnapshot>, StoreError> {
        Ok(self.tables.lock().prices.get(symbol).cloned())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit rejected by fault injection".to_string()));
        }

        let mut tables = self.tables.lock();
        let mut staged = tables.rows.clone();
        let mut trades = Vec::new();
        let mut ledger = Vec::new();

        for write in batch.into_writes() {
            Self::apply(&mut staged, write, &mut trades, &mut ledger)?;
        }

        tables.rows = staged;
        tables.trades.extend(trades);
        tables.ledger.extend(ledger);
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::PositionStatus;
    use crate::types::{Leverage, Side};
    use rust_decimal_macros::dec;

    fn position(id: u64, symbol: &str) -> Position {
        Position::open(
            PositionId(id),
            AgentId::from("agent_a"),
            Symbol::from(symbol),
            Side::Long,
            dec!(1),
            dec!(100),
            Leverage::new(dec!(10)).unwrap(),
            Timestamp::from_millis(0),
        )
    }

    #[tokio::test]
    async fn second_active_position_for_same_symbol_conflicts() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.push(Write::InsertPosition(position(1, "BTCUSD")));
        store.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(Write::InsertPosition(position(2, "BTCUSD")));
        let err = store.commit(batch).await.unwrap_err();
        assert!(err.is_conflict());

        let mut batch = WriteBatch::new();
        batch.push(Write::InsertPosition(position(3, "ETHUSD")));
        store.commit(batch).await.unwrap();
        assert_eq!(store.active_positions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn close_then_insert_in_one_batch_is_a_flip() {
        let store = MemoryStore::new();
        let original = position(1, "BTCUSD");
        let mut batch = WriteBatch::new();
        batch.push(Write::InsertPosition(original.clone()));
        store.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.push(Write::UpdatePosition {
            position: original.closed(dec!(90), dec!(-10), Timestamp::from_millis(1)),
            expected: PositionStatus::Active,
        });
        batch.push(Write::InsertPosition(position(2, "BTCUSD")));
        store.commit(batch).await.unwrap();

        let active = store.active_position(&AgentId::from("agent_a"), &Symbol::from("BTCUSD")).await.unwrap();
        assert_eq!(active.map(|p| p.id), Some(PositionId(2)));
    }

    #[tokio::test]
    async fn failed_guard_applies_nothing() {
        let store = MemoryStore::new();
        let original = position(1, "BTCUSD");
        let mut batch = WriteBatch::new();
        batch.push(Write::InsertPosition(original.clone()));
        store.commit(batch).await.unwrap();

        let closed = original.closed(dec!(110), dec!(10), Timestamp::from_millis(1));
        let wallet = Wallet::new(AgentId::from("agent_a"), dec!(10000), Timestamp::from_millis(1));

        let mut first = WriteBatch::new();
        first.push(Write::UpdatePosition { position: closed.clone(), expected: PositionStatus::Active });
        store.commit(first).await.unwrap();

        // second close of the same position: guard fails, wallet write must not land
        let mut second = WriteBatch::new();
        second.push(Write::UpdatePosition { position: closed, expected: PositionStatus::Active });
        second.push(Write::PutWallet(wallet.clone()));
        assert!(store.commit(second).await.unwrap_err().is_conflict());
        assert_eq!(store.wallet(&wallet.agent_id).await.unwrap(), None);
        assert_eq!(store.commit_count(), 2);
    }

    #[tokio::test]
    async fn injected_failure_is_one_shot() {
        let store = MemoryStore::new();
        store.fail_next_commit();
        let mut batch = WriteBatch::new();
        batch.push(Write::InsertPosition(position(1, "BTCUSD")));
        assert!(matches!(store.commit(batch.clone()).await, Err(StoreError::Unavailable(_))));
        assert!(store.active_positions().await.unwrap().is_empty());

        store.commit(batch).await.unwrap();
        assert_eq!(store.active_positions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn order_transition_is_owner_scoped_and_guarded() {
        use crate::order::OrderRequest;
        use crate::types::OrderSide;

        let store = MemoryStore::new();
        let agent = AgentId::from("agent_a");
        let mut request = OrderRequest::limit("BTCUSD", OrderSide::Buy, dec!(1), dec!(100), dec!(10));
        let leverage = request.validate(dec!(20)).unwrap();
        let id = store.next_order_id().await.unwrap();
        store
            .insert_order(Order::open(id, agent.clone(), request, leverage, Timestamp::from_millis(0)))
            .await
            .unwrap();

        let other = AgentId::from("agent_b");
        let ts = Timestamp::from_millis(1);
        assert!(store.transition_order(id, &other, OrderStatus::Open, OrderStatus::Canceled, ts).await.unwrap().is_none());

        let canceled = store.transition_order(id, &agent, OrderStatus::Open, OrderStatus::Canceled, ts).await.unwrap();
        assert_eq!(canceled.map(|o| o.status), Some(OrderStatus::Canceled));
        assert!(store.transition_order(id, &agent, OrderStatus::Open, OrderStatus::Canceled, ts).await.unwrap().is_none());
        assert!(store.open_limit_orders(&Symbol::from("BTCUSD")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn trades_come_back_newest_first() {
        let store = MemoryStore::new();
        let pos = position(1, "BTCUSD");
        let mut batch = WriteBatch::new();
        for i in 1..=3 {
            batch.push(Write::InsertTrade(Trade::for_slice(&pos, dec!(0.1), Decimal::from(100 + i), dec!(0), Timestamp::from_millis(i))));
        }
        store.commit(batch).await.unwrap();

        let trades = store.trades_for_agent(&AgentId::from("agent_a"), Some(2)).await.unwrap();
        let prices: Vec<Decimal> = trades.iter().map(|t| t.close_price).collect();
        assert_eq!(prices, vec![dec!(103), dec!(102)]);
    }
}
