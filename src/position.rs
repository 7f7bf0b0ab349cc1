// 4.0: position record and its transitions. one active row per (agent, symbol).
// every transition returns a new record; the engine persists it and syncs the cache.
// 4.5 has the tp/sl/liquidation trigger rules at the bottom.

use crate::risk::{initial_margin, liquidation_price, unrealized_pnl, weighted_average_entry};
use crate::types::{round_money, round_qty, AgentId, Leverage, PositionId, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub agent_id: AgentId,
    pub symbol: Symbol,
    pub side: Side,
    pub qty: Decimal,
    pub entry_price: Decimal,
    pub leverage: Leverage,
    pub liq_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub status: PositionStatus,
    pub close_price: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl Position {
    pub fn open(
        id: PositionId,
        agent_id: AgentId,
        symbol: Symbol,
        side: Side,
        qty: Decimal,
        entry_price: Decimal,
        leverage: Leverage,
        timestamp: Timestamp,
    ) -> Self {
        let entry_price = round_money(entry_price);
        Self {
            id,
            agent_id,
            symbol,
            side,
            qty: round_qty(qty),
            entry_price,
            leverage,
            liq_price: liquidation_price(side, entry_price, leverage),
            mark_price: entry_price,
            unrealized_pnl: Decimal::ZERO,
            take_profit_price: None,
            stop_loss_price: None,
            status: PositionStatus::Active,
            close_price: None,
            realized_pnl: None,
            opened_at: timestamp,
            updated_at: timestamp,
            closed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    // 4.1: margin this position locks in the wallet. entry * qty / leverage
    pub fn initial_margin(&self) -> Decimal {
        initial_margin(self.qty, self.entry_price, self.leverage)
    }

    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        unrealized_pnl(self.side, self.qty, self.entry_price, price)
    }

    // 4.2: pyramiding. weighted entry, liquidation moves with it
    pub fn increased(&self, added_qty: Decimal, fill_price: Decimal, timestamp: Timestamp) -> Self {
        let entry_price = weighted_average_entry(self.qty, self.entry_price, added_qty, fill_price);
        Self {
            qty: round_qty(self.qty + added_qty),
            entry_price,
            liq_price: liquidation_price(self.side, entry_price, self.leverage),
            updated_at: timestamp,
            ..self.clone()
        }
    }

    // 4.3: partial close. entry and liquidation price stay where they were
    pub fn reduced(&self, closed_qty: Decimal, timestamp: Timestamp) -> Self {
        debug_assert!(closed_qty < self.qty, "reduce must leave a positive quantity");
        Self {
            qty: round_qty(self.qty - closed_qty),
            updated_at: timestamp,
            ..self.clone()
        }
    }

    // 4.4: terminal. the record is history from here on
    pub fn closed(&self, close_price: Decimal, realized_pnl: Decimal, timestamp: Timestamp) -> Self {
        Self {
            status: PositionStatus::Closed,
            close_price: Some(round_money(close_price)),
            realized_pnl: Some(realized_pnl),
            closed_at: Some(timestamp),
            updated_at: timestamp,
            ..self.clone()
        }
    }

    pub fn with_marks(&self, mark_price: Decimal, timestamp: Timestamp) -> Self {
        Self {
            mark_price: round_money(mark_price),
            unrealized_pnl: self.pnl_at(mark_price),
            updated_at: timestamp,
            ..self.clone()
        }
    }

    pub fn with_risk(
        &self,
        take_profit_price: Option<Decimal>,
        stop_loss_price: Option<Decimal>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            take_profit_price,
            stop_loss_price,
            updated_at: timestamp,
            ..self.clone()
        }
    }

    /// Checks take profit, stop loss then liquidation. The last one that holds picks
    /// the close, so a liquidation coinciding with tp/sl closes at the mark price.
    /// TP/SL need a non zero last; liquidation needs a non zero mark.
    pub fn evaluate_triggers(&self, last: Decimal, mark: Decimal) -> Option<CloseTrigger> {
        let mut trigger = None;

        if !last.is_zero() {
            if let Some(tp) = self.take_profit_price {
                let hit = match self.side {
                    Side::Long => last >= tp,
                    Side::Short => last <= tp,
                };
                if hit {
                    trigger = Some(CloseTrigger { reason: CloseReason::TakeProfit, price: last });
                }
            }
            if let Some(sl) = self.stop_loss_price {
                let hit = match self.side {
                    Side::Long => last <= sl,
                    Side::Short => last >= sl,
                };
                if hit {
                    trigger = Some(CloseTrigger { reason: CloseReason::StopLoss, price: last });
                }
            }
        }

        if !mark.is_zero() {
            let liquidated = match self.side {
                Side::Long => mark <= self.liq_price,
                Side::Short => mark >= self.liq_price,
            };
            if liquidated {
                trigger = Some(CloseTrigger { reason: CloseReason::Liquidation, price: mark });
            }
        }

        trigger
    }
}

/// Why a position was closed. Carried into logs and the ledger metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Manual,
    Netting,
    TakeProfit,
    StopLoss,
    Liquidation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseTrigger {
    pub reason: CloseReason,
    pub price: Decimal,
}
