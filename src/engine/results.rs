// 8.0.2: result types and errors for engine operations.

use crate::ledger::Trade;
use crate::order::{Order, OrderError, OrderStatus};
use crate::position::{CloseReason, Position};
use crate::store::StoreError;
use crate::types::{AgentId, OrderId, PositionId, Symbol};
use crate::wallet::WalletView;
use rust_decimal::Decimal;
use serde::Serialize;

/// What a fill did to the agent's position in the symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FillAction {
    Opened,
    Increased,
    Reduced,
    Closed,
    Flipped,
    /// Reduce only order with nothing to reduce. The order is still consumed.
    NoChange,
}

#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub order_id: OrderId,
    pub action: FillAction,
    pub price: Decimal,
    pub realized_pnl: Decimal,
    /// Active position after the fill, if any.
    pub position: Option<Position>,
}

#[derive(Debug, Clone)]
pub struct CloseOutcome {
    pub position: Position,
    pub reason: CloseReason,
    pub realized_pnl: Decimal,
}

/// Reply to an agent initiated close.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedPosition {
    pub symbol: Symbol,
    pub close_price: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub fills: usize,
    pub closes: usize,
    pub refreshed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionView {
    pub position: Position,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub margin_invested: Decimal,
    pub roi_percent: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub order: Order,
    pub current_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountOverview {
    pub wallet: WalletView,
    pub positions: Vec<PositionView>,
    pub open_orders: Vec<OrderView>,
    pub recent_trades: Vec<Trade>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStats {
    pub agent_id: AgentId,
    pub equity: Decimal,
    pub balance: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub win_rate: Decimal,
    pub volume: Decimal,
    pub total_trades: usize,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("No market data for {0}")]
    UnknownSymbol(Symbol),

    #[error("Market price data unavailable for {0}")]
    NoPrice(Symbol),

    #[error("Wallet not found for {0}")]
    WalletNotFound(AgentId),

    #[error("Wallet already exists for {0}")]
    WalletExists(AgentId),

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Decimal, available: Decimal },

    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    #[error("Order {id} not found or already {status}")]
    OrderNotOpen { id: OrderId, status: OrderStatus },

    #[error("No active position for {0}")]
    PositionNotFound(Symbol),

    #[error("Position {0} not found or already settled")]
    AlreadyClosed(PositionId),

    #[error("Risk price must be positive, got {0}")]
    InvalidRiskPrice(Decimal),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
