// 8.7 engine/reports.rs: read only account views. priced at the latest last price,
// falling back to the position's cached mark. nothing here takes an agent lock.

use super::core::Engine;
use super::results::{AccountOverview, AgentStats, EngineError, OrderView, PositionView};
use crate::ledger::Trade;
use crate::risk::roi_percent;
use crate::types::{round_money, AgentId};
use crate::wallet::WalletView;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

impl Engine {
    pub async fn overview(&self, agent_id: &AgentId) -> Result<AccountOverview, EngineError> {
        let wallet = self.load_wallet(agent_id).await?;
        let active = self.store.active_positions_for_agent(agent_id).await?;
        let orders = self.store.open_orders_for_agent(agent_id).await?;
        let recent_trades = self
            .store
            .trades_for_agent(agent_id, Some(self.config.trade_history_limit))
            .await?;

        let positions: Vec<PositionView> = active
            .into_iter()
            .map(|position| {
                let current_price = self.live_price(&position);
                let unrealized_pnl = position.pnl_at(current_price);
                let margin_invested = position.initial_margin();
                PositionView {
                    current_price,
                    unrealized_pnl,
                    margin_invested,
                    roi_percent: roi_percent(unrealized_pnl, margin_invested),
                    position,
                }
            })
            .collect();
        let unrealized: Decimal = positions.iter().map(|p| p.unrealized_pnl).sum();

        let open_orders = orders
            .into_iter()
            .map(|order| OrderView {
                current_price: self.quotes.get(&order.symbol).map(|q| q.last),
                order,
            })
            .collect();

        Ok(AccountOverview {
            wallet: WalletView::new(&wallet, unrealized),
            positions,
            open_orders,
            recent_trades,
        })
    }

    pub async fn agent_stats(&self, agent_id: &AgentId) -> Result<AgentStats, EngineError> {
        let wallet = self.load_wallet(agent_id).await?;
        let active = self.store.active_positions_for_agent(agent_id).await?;
        let trades = self.store.trades_for_agent(agent_id, None).await?;

        let unrealized_pnl: Decimal = active.iter().map(|p| p.pnl_at(self.live_price(p))).sum();
        let realized_pnl: Decimal = trades.iter().map(|t| t.realized_pnl).sum();
        let volume: Decimal = trades.iter().map(Trade::entry_notional).sum();

        Ok(AgentStats {
            agent_id: agent_id.clone(),
            equity: wallet.equity(unrealized_pnl),
            balance: wallet.balance,
            realized_pnl: round_money(realized_pnl),
            unrealized_pnl: round_money(unrealized_pnl),
            win_rate: win_rate(&trades),
            volume: round_money(volume),
            total_trades: trades.len(),
        })
    }
}

// whole percent of winning trades, 0 with no history
fn win_rate(trades: &[Trade]) -> Decimal {
    if trades.is_empty() {
        return Decimal::ZERO;
    }
    let wins = trades.iter().filter(|t| t.is_win()).count();
    (Decimal::from(wins) / Decimal::from(trades.len()) * dec!(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}
