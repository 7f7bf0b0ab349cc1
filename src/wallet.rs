//! Agent wallet and derived margin metrics.
//!
//! One wallet per agent. `balance` is settled USD, `used_margin` is the initial
//! margin locked by active positions. Equity and free margin are computed on read,
//! never stored, so a read path can never drift them.

use crate::types::{round_money, AgentId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub agent_id: AgentId,
    pub balance: Decimal,
    pub used_margin: Decimal,
    pub realized_pnl: Decimal,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Wallet {
    pub fn new(agent_id: AgentId, starting_balance: Decimal, timestamp: Timestamp) -> Self {
        Self {
            agent_id,
            balance: round_money(starting_balance),
            used_margin: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn free_margin(&self) -> Decimal {
        self.balance - self.used_margin
    }

    pub fn equity(&self, unrealized_pnl: Decimal) -> Decimal {
        round_money(self.balance + unrealized_pnl)
    }

    /// Moves `amount` of free margin into used margin. Negative amounts release.
    pub fn adjust_margin(&mut self, amount: Decimal, timestamp: Timestamp) {
        self.used_margin = round_money(self.used_margin + amount);
        self.updated_at = timestamp;
    }

    pub fn realize_pnl(&mut self, pnl: Decimal, timestamp: Timestamp) {
        self.balance = round_money(self.balance + pnl);
        self.realized_pnl = round_money(self.realized_pnl + pnl);
        self.updated_at = timestamp;
    }

    pub fn can_afford(&self, required_margin: Decimal) -> bool {
        required_margin <= self.free_margin()
    }
}

/// Read side view with the derived numbers filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletView {
    pub agent_id: AgentId,
    pub balance: Decimal,
    pub used_margin: Decimal,
    pub free_margin: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub equity: Decimal,
}

impl WalletView {
    pub fn new(wallet: &Wallet, unrealized_pnl: Decimal) -> Self {
        Self {
            agent_id: wallet.agent_id.clone(),
            balance: wallet.balance,
            used_margin: wallet.used_margin,
            free_margin: wallet.free_margin(),
            realized_pnl: wallet.realized_pnl,
            unrealized_pnl: round_money(unrealized_pnl),
            equity: wallet.equity(unrealized_pnl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_wallet() -> Wallet {
        Wallet::new(AgentId::from("agent_a"), dec!(10000), Timestamp::from_millis(0))
    }

    #[test]
    fn margin_moves_between_free_and_used() {
        let mut wallet = test_wallet();
        wallet.adjust_margin(dec!(5000), Timestamp::from_millis(1));
        assert_eq!(wallet.used_margin, dec!(5000));
        assert_eq!(wallet.free_margin(), dec!(5000));
        assert_eq!(wallet.balance, dec!(10000));

        wallet.adjust_margin(dec!(-5000), Timestamp::from_millis(2));
        assert_eq!(wallet.free_margin(), dec!(10000));
    }

    #[test]
    fn realized_pnl_settles_into_balance() {
        let mut wallet = test_wallet();
        wallet.realize_pnl(dec!(1000), Timestamp::from_millis(1));
        assert_eq!(wallet.balance, dec!(11000));
        assert_eq!(wallet.realized_pnl, dec!(1000));

        wallet.realize_pnl(dec!(-500), Timestamp::from_millis(2));
        assert_eq!(wallet.balance, dec!(10500));
        assert_eq!(wallet.realized_pnl, dec!(500));
    }

    #[test]
    fn equity_includes_unrealized() {
        let wallet = test_wallet();
        let view = WalletView::new(&wallet, dec!(-250.5));
        assert_eq!(view.equity, dec!(9749.5));
        assert_eq!(view.free_margin, dec!(10000));
    }

    #[test]
    fn affordability_uses_free_margin() {
        let mut wallet = test_wallet();
        wallet.adjust_margin(dec!(9000), Timestamp::from_millis(1));
        assert!(wallet.can_afford(dec!(1000)));
        assert!(!wallet.can_afford(dec!(1000.0001)));
    }
}
