// 5.0: append only history. trades record every realized slice, the ledger records
// every settlement affecting engine action. neither is ever read back by the engine.

use crate::order::OrderType;
use crate::position::{CloseReason, Position};
use crate::types::{round_qty, AgentId, Leverage, OrderId, PositionId, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One realized fill: a partial or a full close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub agent_id: AgentId,
    pub symbol: Symbol,
    pub position_id: PositionId,
    pub side: Side,
    pub qty: Decimal,
    pub entry_price: Decimal,
    pub close_price: Decimal,
    pub realized_pnl: Decimal,
    pub leverage: Leverage,
    pub closed_at: Timestamp,
}

impl Trade {
    pub fn for_slice(
        position: &Position,
        qty: Decimal,
        close_price: Decimal,
        realized_pnl: Decimal,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            agent_id: position.agent_id.clone(),
            symbol: position.symbol.clone(),
            position_id: position.id,
            side: position.side,
            qty: round_qty(qty),
            entry_price: position.entry_price,
            close_price,
            realized_pnl,
            leverage: position.leverage,
            closed_at: timestamp,
        }
    }

    pub fn is_win(&self) -> bool {
        self.realized_pnl > Decimal::ZERO
    }

    pub fn entry_notional(&self) -> Decimal {
        self.qty * self.entry_price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerAction {
    Fill,
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerMetadata {
    Fill {
        order_id: OrderId,
        order_type: OrderType,
        leverage: Leverage,
        reduce_only: bool,
    },
    Close {
        position_id: PositionId,
        reason: CloseReason,
        pnl: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub agent_id: AgentId,
    pub action: LedgerAction,
    pub symbol: Symbol,
    pub qty: Decimal,
    pub price: Decimal,
    pub metadata: LedgerMetadata,
    pub created_at: Timestamp,
}

impl LedgerEntry {
    pub fn close(position: &Position, price: Decimal, reason: CloseReason, pnl: Decimal, timestamp: Timestamp) -> Self {
        Self {
            agent_id: position.agent_id.clone(),
            action: LedgerAction::Close,
            symbol: position.symbol.clone(),
            qty: position.qty,
            price,
            metadata: LedgerMetadata::Close {
                position_id: position.id,
                reason,
                pnl,
            },
            created_at: timestamp,
        }
    }

    pub fn action(&self) -> LedgerAction {
        self.action
    }
}
