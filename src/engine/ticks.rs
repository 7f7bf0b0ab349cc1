// 8.6 engine/ticks.rs: market tick. fill crossing limits, then walk a snapshot of the
// symbol's active positions: close the ones whose tp/sl/liquidation fired, refresh
// marks on the rest. one bad position never stops the scan.

use super::core::Engine;
use super::results::{EngineError, TickSummary};
use crate::position::{CloseTrigger, Position};
use crate::types::Symbol;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

impl Engine {
    pub async fn on_tick(&self, symbol: &Symbol) -> Result<TickSummary, EngineError> {
        self.ensure_hydrated().await?;

        let Some(quote) = self.quotes.get(symbol) else {
            return Ok(TickSummary::default());
        };

        let mut summary = TickSummary::default();
        if quote.has_last() {
            summary.fills = self.fill_crossing_orders(symbol, quote.last).await;
        }

        let mark = quote.effective_mark();
        for position in self.positions.snapshot(symbol) {
            match position.evaluate_triggers(quote.last, mark) {
                Some(trigger) => {
                    if self.close_on_trigger(&position, quote.last, mark, trigger).await {
                        summary.closes += 1;
                    }
                }
                None if !mark.is_zero() => {
                    self.refresh_marks(&position, mark).await;
                    summary.refreshed += 1;
                }
                None => {}
            }
        }

        Ok(summary)
    }

    /// Takes the agent lock, re-reads the position and re-checks the trigger before
    /// closing. Returns true when this call closed it.
    async fn close_on_trigger(&self, snapshot: &Position, last: Decimal, mark: Decimal, first: CloseTrigger) -> bool {
        let _guard = self.lock_agent(&snapshot.agent_id).await;

        // closed or reshaped while we waited for the lock
        let Some(fresh) = self.positions.find(&snapshot.symbol, snapshot.id) else {
            debug!(position_id = %snapshot.id, "position left the cache before trigger close");
            return false;
        };
        let Some(trigger) = fresh.evaluate_triggers(last, mark) else {
            debug!(position_id = %fresh.id, reason = ?first.reason, "trigger no longer holds");
            return false;
        };

        match self.close(&fresh, trigger.price, trigger.reason).await {
            Ok(outcome) => {
                info!(
                    position_id = %fresh.id,
                    agent = %fresh.agent_id,
                    reason = ?trigger.reason,
                    price = %trigger.price,
                    realized_pnl = %outcome.realized_pnl,
                    "trigger close"
                );
                true
            }
            Err(EngineError::AlreadyClosed(id)) => {
                warn!(position_id = %id, "trigger close lost the race");
                false
            }
            Err(err) => {
                error!(position_id = %fresh.id, error = %err, "trigger close failed");
                false
            }
        }
    }

    // cache on every tick, store at most once per interval per position
    async fn refresh_marks(&self, position: &Position, mark: Decimal) {
        let now = self.now();
        let Some(updated) = self.positions.update_marks(&position.symbol, position.id, mark, now) else {
            return;
        };
        if !self.pnl_writes.try_pass(position.id, now) {
            return;
        }

        match self
            .store
            .update_position_marks(updated.id, updated.mark_price, updated.unrealized_pnl, now)
            .await
        {
            Ok(true) => debug!(position_id = %updated.id, mark = %updated.mark_price, "marks persisted"),
            Ok(false) => debug!(position_id = %updated.id, "marks not persisted, position no longer active"),
            Err(err) => warn!(position_id = %updated.id, error = %err, "mark persist failed"),
        }
    }
}
