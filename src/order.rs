//! Order types and limit trigger rules.
//!
//! There is no book. Every fill is against the externally observed last price:
//! market orders fill on arrival, limit orders rest until a tick crosses them.
//! Fills are all or nothing.

use crate::types::{round_qty, AgentId, Leverage, OrderId, OrderSide, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order time in force options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good till canceled. Rests until filled or canceled.
    #[default]
    GTC,
    /// Immediate or cancel. Limit orders that do not cross on arrival are canceled.
    IOC,
    /// Fill or kill. Same as IOC here since fills are never partial.
    FOK,
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Fills at the last price on arrival.
    Market,
    /// Fills at the last price once it crosses the limit.
    Limit,
}

/// Order lifecycle. `Filled` is reported to the caller but never stored:
/// a filled order is deleted and lives on as position, wallet and ledger changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
    Rejected,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Open => "open",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// What an agent asks for. Validated into an [`Order`] by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub leverage: Decimal,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    #[serde(default)]
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<Symbol>, side: OrderSide, qty: Decimal, leverage: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            qty,
            leverage,
            price: None,
            reduce_only: false,
            time_in_force: TimeInForce::GTC,
            client_order_id: None,
        }
    }

    pub fn limit(
        symbol: impl Into<Symbol>,
        side: OrderSide,
        qty: Decimal,
        price: Decimal,
        leverage: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            qty,
            leverage,
            price: Some(price),
            reduce_only: false,
            time_in_force: TimeInForce::GTC,
            client_order_id: None,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    pub fn with_client_order_id(mut self, client_order_id: impl Into<String>) -> Self {
        self.client_order_id = Some(client_order_id.into());
        self
    }

    /// Shape checks that need no market data. Rounds `qty` to 8 dp in place and
    /// returns the validated leverage.
    pub fn validate(&mut self, max_leverage: Decimal) -> Result<Leverage, OrderError> {
        // netting compares against stored 8 dp quantities, a qty that rounds away is no qty
        let qty = round_qty(self.qty);
        if qty <= Decimal::ZERO {
            return Err(OrderError::InvalidQty(self.qty));
        }
        self.qty = qty;

        let leverage = Leverage::new(self.leverage)
            .filter(|l| l.value() <= max_leverage)
            .ok_or(OrderError::InvalidLeverage {
                requested: self.leverage,
                max: max_leverage,
            })?;

        match self.order_type {
            OrderType::Limit => match self.price {
                None => return Err(OrderError::MissingLimitPrice),
                Some(price) if price <= Decimal::ZERO => return Err(OrderError::InvalidPrice(price)),
                Some(_) => {}
            },
            OrderType::Market => {}
        }

        Ok(leverage)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub agent_id: AgentId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub leverage: Leverage,
    pub reduce_only: bool,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    pub client_order_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Order {
    pub fn open(
        id: OrderId,
        agent_id: AgentId,
        request: OrderRequest,
        leverage: Leverage,
        timestamp: Timestamp,
    ) -> Self {
        // market orders never carry a price
        let price = match request.order_type {
            OrderType::Limit => request.price,
            OrderType::Market => None,
        };

        Self {
            id,
            agent_id,
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            qty: request.qty,
            price,
            leverage,
            reduce_only: request.reduce_only,
            status: OrderStatus::Open,
            time_in_force: request.time_in_force,
            client_order_id: request.client_order_id,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    /// Whether `last` fills this resting limit order. A zero last is no price at all.
    pub fn crosses(&self, last: Decimal) -> bool {
        if last.is_zero() {
            return false;
        }
        match (self.order_type, self.price) {
            (OrderType::Limit, Some(limit)) => match self.side {
                OrderSide::Buy => last <= limit,
                OrderSide::Sell => last >= limit,
            },
            (OrderType::Limit, None) | (OrderType::Market, _) => false,
        }
    }

    pub fn with_status(mut self, status: OrderStatus, timestamp: Timestamp) -> Self {
        self.status = status;
        self.updated_at = timestamp;
        self
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("Order quantity must be positive, got {0}")]
    InvalidQty(Decimal),

    #[error("Leverage {requested} outside 1..={max}")]
    InvalidLeverage { requested: Decimal, max: Decimal },

    #[error("Limit order requires a price")]
    MissingLimitPrice,

    #[error("Limit price must be positive, got {0}")]
    InvalidPrice(Decimal),
}
