//! Engine configuration options.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Highest leverage an order may request.
    pub max_leverage: Decimal,
    /// Balance credited when a wallet is opened.
    pub starting_balance: Decimal,
    /// Minimum gap between persisted mark refreshes of one position.
    pub pnl_persist_interval_ms: i64,
    /// Size of the per symbol recent trade ring in the quote cache.
    pub recent_trade_ring: usize,
    /// Closed trades returned by the account overview.
    pub trade_history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_leverage: dec!(20),
            starting_balance: dec!(10000),
            pnl_persist_interval_ms: 5_000,
            recent_trade_ring: 50,
            trade_history_limit: 50,
        }
    }
}
