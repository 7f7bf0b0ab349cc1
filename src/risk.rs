//! Risk calculator: unrealized PnL, liquidation price, weighted entry and margin.
//!
//! Everything here is a pure function over decimals. No I/O, no shared state,
//! so the engine can call it under any lock and the property tests can hammer it
//! directly. Every result is rounded half up to [`MONEY_DP`](crate::types::MONEY_DP).
//!
//! The liquidation model is simplified on purpose: a position is liquidated once
//! 80% of its initial margin is gone. There are no maintenance tiers.

use crate::types::{round_money, Leverage, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Share of initial margin that may be lost before liquidation.
pub const LIQUIDATION_LOSS_FRACTION: Decimal = dec!(0.8);

// 3.1: paper gains/losses. long (mark - entry) * qty, short (entry - mark) * qty
pub fn unrealized_pnl(side: Side, qty: Decimal, entry_price: Decimal, mark_price: Decimal) -> Decimal {
    let pnl = match side {
        Side::Long => (mark_price - entry_price) * qty,
        Side::Short => (entry_price - mark_price) * qty,
    };
    round_money(pnl)
}

/// Price at which [`LIQUIDATION_LOSS_FRACTION`] of the initial margin is lost.
pub fn liquidation_price(side: Side, entry_price: Decimal, leverage: Leverage) -> Decimal {
    let initial_margin = entry_price / leverage.value();
    let loss_to_liquidate = initial_margin * LIQUIDATION_LOSS_FRACTION;

    let liq_price = match side {
        Side::Long => entry_price - loss_to_liquidate,
        Side::Short => entry_price + loss_to_liquidate,
    };
    round_money(liq_price)
}

// 3.2: only used when adding to a same side position
pub fn weighted_average_entry(
    old_qty: Decimal,
    old_entry: Decimal,
    added_qty: Decimal,
    fill_price: Decimal,
) -> Decimal {
    let total_qty = old_qty + added_qty;
    if total_qty.is_zero() {
        return round_money(old_entry);
    }
    round_money((old_entry * old_qty + fill_price * added_qty) / total_qty)
}

// 3.3: margin locked by a position. notional / leverage
pub fn initial_margin(qty: Decimal, price: Decimal, leverage: Leverage) -> Decimal {
    round_money(qty * price / leverage.value())
}

pub fn roi_percent(unrealized_pnl: Decimal, margin: Decimal) -> Decimal {
    if margin.is_zero() {
        return Decimal::ZERO;
    }
    round_money(unrealized_pnl / margin * dec!(100))
}
