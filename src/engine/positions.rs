//! Position settlement for fills and closes.
//!
//! Every fill and every close is built up as one [`WriteBatch`] against a working
//! copy of the wallet, then committed in one call. Nothing touches the cache until
//! the commit succeeded.

use super::core::Engine;
use super::results::{ClosedPosition, CloseOutcome, EngineError, FillAction, FillOutcome};
use crate::ledger::{LedgerAction, LedgerEntry, LedgerMetadata, Trade};
use crate::order::{Order, OrderStatus};
use crate::position::{CloseReason, Position, PositionStatus};
use crate::risk::unrealized_pnl;
use crate::store::{Write, WriteBatch};
use crate::types::{round_money, AgentId, Leverage, PositionId, Side, Symbol, Timestamp};
use crate::wallet::Wallet;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use tracing::{info, warn};

/// Working state of one settlement: pending writes, the wallet as it will look
/// after them, and the position rows the cache must learn about.
struct Settlement {
    batch: WriteBatch,
    wallet: Wallet,
    touched: Vec<Position>,
    realized_pnl: Decimal,
    timestamp: Timestamp,
}

impl Settlement {
    fn new(wallet: Wallet, timestamp: Timestamp) -> Self {
        Self {
            batch: WriteBatch::new(),
            wallet,
            touched: Vec::new(),
            realized_pnl: Decimal::ZERO,
            timestamp,
        }
    }

    fn reserve(&mut self, margin: Decimal) -> Result<(), EngineError> {
        if margin > Decimal::ZERO && !self.wallet.can_afford(margin) {
            return Err(EngineError::InsufficientMargin {
                required: margin,
                available: self.wallet.free_margin(),
            });
        }
        self.wallet.adjust_margin(margin, self.timestamp);
        Ok(())
    }

    fn open(
        &mut self,
        id: PositionId,
        order: &Order,
        side: Side,
        qty: Decimal,
        price: Decimal,
        leverage: Leverage,
    ) -> Result<Position, EngineError> {
        let position = Position::open(id, order.agent_id.clone(), order.symbol.clone(), side, qty, price, leverage, self.timestamp);
        self.reserve(position.initial_margin())?;
        self.batch.push(Write::InsertPosition(position.clone()));
        self.touched.push(position.clone());
        Ok(position)
    }

    fn increase(&mut self, position: &Position, qty: Decimal, price: Decimal) -> Result<Position, EngineError> {
        let increased = position.increased(qty, price, self.timestamp);
        self.reserve(increased.initial_margin() - position.initial_margin())?;
        self.batch.push(Write::UpdatePosition {
            position: increased.clone(),
            expected: PositionStatus::Active,
        });
        self.touched.push(increased.clone());
        Ok(increased)
    }

    fn reduce(&mut self, position: &Position, qty: Decimal, price: Decimal) -> Position {
        let pnl = unrealized_pnl(position.side, qty, position.entry_price, price);
        let reduced = position.reduced(qty, self.timestamp);

        self.wallet.realize_pnl(pnl, self.timestamp);
        self.wallet
            .adjust_margin(reduced.initial_margin() - position.initial_margin(), self.timestamp);
        self.realized_pnl += pnl;

        self.batch.push(Write::UpdatePosition {
            position: reduced.clone(),
            expected: PositionStatus::Active,
        });
        self.batch
            .push(Write::InsertTrade(Trade::for_slice(position, qty, price, pnl, self.timestamp)));
        self.touched.push(reduced.clone());
        reduced
    }

    // guarded active -> closed goes first so a lost race fails before anything else applies
    fn close(&mut self, position: &Position, price: Decimal, reason: CloseReason) -> Position {
        let pnl = position.pnl_at(price);
        let closed = position.closed(price, pnl, self.timestamp);

        self.batch.push(Write::UpdatePosition {
            position: closed.clone(),
            expected: PositionStatus::Active,
        });
        self.wallet.realize_pnl(pnl, self.timestamp);
        self.wallet.adjust_margin(-position.initial_margin(), self.timestamp);
        self.realized_pnl += pnl;

        self.batch.push(Write::InsertTrade(Trade::for_slice(
            position,
            position.qty,
            round_money(price),
            pnl,
            self.timestamp,
        )));
        self.batch
            .push(Write::AppendLedger(LedgerEntry::close(position, round_money(price), reason, pnl, self.timestamp)));
        self.touched.push(closed.clone());
        closed
    }

    fn into_batch(mut self) -> (WriteBatch, Vec<Position>, Decimal) {
        self.batch.push(Write::PutWallet(self.wallet));
        (self.batch, self.touched, self.realized_pnl)
    }
}

impl Engine {
    /// Nets `order` against the agent's position in its symbol at `price`.
    /// Caller holds the agent lock.
    pub(super) async fn fill(&self, order: &Order, price: Decimal) -> Result<FillOutcome, EngineError> {
        let price = round_money(price);
        let now = self.now();
        let wallet = self.load_wallet(&order.agent_id).await?;
        let existing = self.store.active_position(&order.agent_id, &order.symbol).await?;
        let side = order.side.position_side();

        let mut settlement = Settlement::new(wallet, now);
        let (action, position) = match existing {
            None if order.reduce_only => (FillAction::NoChange, None),
            None => {
                let id = self.store.next_position_id().await?;
                let opened = settlement.open(id, order, side, order.qty, price, order.leverage)?;
                (FillAction::Opened, Some(opened))
            }
            Some(current) if current.side == side => {
                if order.reduce_only {
                    (FillAction::NoChange, Some(current))
                } else {
                    let increased = settlement.increase(&current, order.qty, price)?;
                    (FillAction::Increased, Some(increased))
                }
            }
            Some(current) => match order.qty.cmp(&current.qty) {
                Ordering::Less => {
                    let reduced = settlement.reduce(&current, order.qty, price);
                    (FillAction::Reduced, Some(reduced))
                }
                Ordering::Equal => {
                    settlement.close(&current, price, CloseReason::Netting);
                    (FillAction::Closed, None)
                }
                Ordering::Greater => {
                    settlement.close(&current, price, CloseReason::Netting);
                    if order.reduce_only {
                        (FillAction::Closed, None)
                    } else {
                        // flip takes the order's leverage, not the closed position's
                        let id = self.store.next_position_id().await?;
                        let surplus = order.qty - current.qty;
                        let flipped = settlement.open(id, order, side, surplus, price, order.leverage)?;
                        (FillAction::Flipped, Some(flipped))
                    }
                }
            },
        };

        settlement.batch.push(Write::DeleteOrder {
            id: order.id,
            expected: OrderStatus::Open,
        });
        settlement.batch.push(Write::AppendLedger(LedgerEntry {
            agent_id: order.agent_id.clone(),
            action: LedgerAction::Fill,
            symbol: order.symbol.clone(),
            qty: order.qty,
            price,
            metadata: LedgerMetadata::Fill {
                order_id: order.id,
                order_type: order.order_type,
                leverage: order.leverage,
                reduce_only: order.reduce_only,
            },
            created_at: now,
        }));

        let (batch, touched, realized_pnl) = settlement.into_batch();
        self.store.commit(batch).await?;
        for row in &touched {
            if row.is_active() {
                self.positions.sync(&self.with_cached_marks(row));
            } else {
                self.positions.sync(row);
                self.pnl_writes.forget(&row.id);
            }
        }

        Ok(FillOutcome {
            order_id: order.id,
            action,
            price,
            realized_pnl,
            position,
        })
    }

    /// Closes `position` at `price`. Caller holds the agent lock. A position that is
    /// no longer active in the store is dropped from the cache and reported as
    /// [`EngineError::AlreadyClosed`] with no wallet effect.
    pub(super) async fn close(&self, position: &Position, price: Decimal, reason: CloseReason) -> Result<CloseOutcome, EngineError> {
        let now = self.now();
        let wallet = self.load_wallet(&position.agent_id).await?;

        let mut settlement = Settlement::new(wallet, now);
        let closed = settlement.close(position, price, reason);
        let (batch, _, realized_pnl) = settlement.into_batch();

        match self.store.commit(batch).await {
            Ok(()) => {}
            Err(err) if err.is_conflict() => {
                warn!(position_id = %position.id, symbol = %position.symbol, "position already closed, skipping");
                self.positions.remove(&position.symbol, position.id);
                self.pnl_writes.forget(&position.id);
                return Err(EngineError::AlreadyClosed(position.id));
            }
            Err(err) => return Err(err.into()),
        }

        self.positions.sync(&closed);
        self.pnl_writes.forget(&position.id);
        info!(
            agent = %position.agent_id,
            position_id = %position.id,
            symbol = %position.symbol,
            reason = ?reason,
            close_price = %round_money(price),
            realized_pnl = %realized_pnl,
            "position closed"
        );

        Ok(CloseOutcome {
            position: closed,
            reason,
            realized_pnl,
        })
    }

    /// Closes the agent's active position in `symbol` at the latest last price.
    pub async fn close_position(&self, agent_id: &AgentId, symbol: &Symbol) -> Result<ClosedPosition, EngineError> {
        self.ensure_hydrated().await?;

        let quote = self
            .quotes
            .get(symbol)
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.clone()))?;
        if !quote.has_last() {
            return Err(EngineError::NoPrice(symbol.clone()));
        }

        let _guard = self.lock_agent(agent_id).await;
        let position = self
            .store
            .active_position(agent_id, symbol)
            .await?
            .ok_or_else(|| EngineError::PositionNotFound(symbol.clone()))?;

        let outcome = self.close(&position, quote.last, CloseReason::Manual).await?;
        Ok(ClosedPosition {
            symbol: symbol.clone(),
            close_price: outcome.position.close_price.unwrap_or(quote.last),
        })
    }

    /// Sets or clears take profit and stop loss. A zero price clears the level.
    pub async fn set_risk(
        &self,
        agent_id: &AgentId,
        symbol: &Symbol,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> Result<Position, EngineError> {
        let take_profit = normalize_risk_price(take_profit)?;
        let stop_loss = normalize_risk_price(stop_loss)?;

        self.ensure_hydrated().await?;
        let _guard = self.lock_agent(agent_id).await;

        let position = self
            .store
            .active_position(agent_id, symbol)
            .await?
            .ok_or_else(|| EngineError::PositionNotFound(symbol.clone()))?;
        let updated = position.with_risk(take_profit, stop_loss, self.now());

        let mut batch = WriteBatch::new();
        batch.push(Write::UpdatePosition {
            position: updated.clone(),
            expected: PositionStatus::Active,
        });
        match self.store.commit(batch).await {
            Ok(()) => {}
            Err(err) if err.is_conflict() => return Err(EngineError::PositionNotFound(symbol.clone())),
            Err(err) => return Err(err.into()),
        }

        self.positions.sync(&self.with_cached_marks(&updated));

        info!(agent = %agent_id, symbol = %symbol, take_profit = ?take_profit, stop_loss = ?stop_loss, "risk levels set");
        Ok(updated)
    }

    // stored rows carry the last persisted marks, the cached copy is refreshed every tick
    fn with_cached_marks(&self, row: &Position) -> Position {
        match self.positions.find(&row.symbol, row.id) {
            Some(cached) if !cached.mark_price.is_zero() => row.with_marks(cached.mark_price, row.updated_at),
            _ => row.clone(),
        }
    }
}

fn normalize_risk_price(price: Option<Decimal>) -> Result<Option<Decimal>, EngineError> {
    match price {
        None => Ok(None),
        Some(p) if p.is_zero() => Ok(None),
        Some(p) if p < Decimal::ZERO => Err(EngineError::InvalidRiskPrice(p)),
        Some(p) => Ok(Some(round_money(p))),
    }
}
