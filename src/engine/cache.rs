// 8.0.1 engine/cache.rs: active positions grouped by symbol. the tick path scans
// this instead of the store. every store write of a position is followed by sync().

use crate::position::Position;
use crate::types::{AgentId, PositionId, Symbol, Timestamp};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ActivePositionCache {
    by_symbol: RwLock<HashMap<Symbol, Vec<Position>>>,
}

impl ActivePositionCache {
    /// Replaces the whole cache. Closed rows are ignored.
    pub fn load(&self, positions: Vec<Position>) {
        let mut by_symbol: HashMap<Symbol, Vec<Position>> = HashMap::new();
        for position in positions.into_iter().filter(Position::is_active) {
            by_symbol.entry(position.symbol.clone()).or_default().push(position);
        }
        *self.by_symbol.write() = by_symbol;
    }

    /// Upserts an active position, drops a closed one.
    pub fn sync(&self, position: &Position) {
        let mut by_symbol = self.by_symbol.write();
        let list = by_symbol.entry(position.symbol.clone()).or_default();
        let slot = list.iter().position(|p| p.id == position.id);

        match (position.is_active(), slot) {
            (true, Some(idx)) => list[idx] = position.clone(),
            (true, None) => list.push(position.clone()),
            (false, Some(idx)) => {
                list.remove(idx);
            }
            (false, None) => {}
        }
        if list.is_empty() {
            by_symbol.remove(&position.symbol);
        }
    }

    pub fn remove(&self, symbol: &Symbol, id: PositionId) {
        let mut by_symbol = self.by_symbol.write();
        if let Some(list) = by_symbol.get_mut(symbol) {
            list.retain(|p| p.id != id);
            if list.is_empty() {
                by_symbol.remove(symbol);
            }
        }
    }

    /// Copy of the symbol's positions. Safe to iterate while the cache changes.
    pub fn snapshot(&self, symbol: &Symbol) -> Vec<Position> {
        self.by_symbol.read().get(symbol).cloned().unwrap_or_default()
    }

    pub fn find(&self, symbol: &Symbol, id: PositionId) -> Option<Position> {
        self.by_symbol
            .read()
            .get(symbol)
            .and_then(|list| list.iter().find(|p| p.id == id).cloned())
    }

    pub fn for_agent(&self, agent_id: &AgentId) -> Vec<Position> {
        self.by_symbol
            .read()
            .values()
            .flatten()
            .filter(|p| &p.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// Refreshes mark and unrealized pnl in place. Returns the updated copy.
    pub fn update_marks(&self, symbol: &Symbol, id: PositionId, mark_price: Decimal, timestamp: Timestamp) -> Option<Position> {
        let mut by_symbol = self.by_symbol.write();
        let cached = by_symbol.get_mut(symbol)?.iter_mut().find(|p| p.id == id)?;
        *cached = cached.with_marks(mark_price, timestamp);
        Some(cached.clone())
    }

    pub fn len(&self) -> usize {
        self.by_symbol.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Leverage, Side};
    use rust_decimal_macros::dec;

    fn position(id: u64, symbol: &str) -> Position {
        Position::open(
            PositionId(id),
            AgentId::from("agent_a"),
            Symbol::from(symbol),
            Side::Long,
            dec!(1),
            dec!(100),
            Leverage::new(dec!(10)).unwrap(),
            Timestamp::from_millis(0),
        )
    }

    #[test]
    fn sync_upserts_active_and_drops_closed() {
        let cache = ActivePositionCache::default();
        let btc = Symbol::from("BTCUSD");
        let pos = position(1, "BTCUSD");

        cache.sync(&pos);
        cache.sync(&pos.increased(dec!(1), dec!(102), Timestamp::from_millis(1)));
        let cached = cache.snapshot(&btc);
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].qty, dec!(2));

        cache.sync(&pos.closed(dec!(101), dec!(1), Timestamp::from_millis(2)));
        assert!(cache.snapshot(&btc).is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn load_ignores_closed_rows() {
        let cache = ActivePositionCache::default();
        let closed = position(2, "ETHUSD").closed(dec!(100), dec!(0), Timestamp::from_millis(1));
        cache.load(vec![position(1, "BTCUSD"), closed, position(3, "ETHUSD")]);

        assert_eq!(cache.len(), 2);
        assert!(cache.find(&Symbol::from("ETHUSD"), PositionId(2)).is_none());
        assert!(cache.find(&Symbol::from("ETHUSD"), PositionId(3)).is_some());
    }

    #[test]
    fn marks_update_in_place() {
        let cache = ActivePositionCache::default();
        let btc = Symbol::from("BTCUSD");
        cache.sync(&position(1, "BTCUSD"));

        let updated = cache.update_marks(&btc, PositionId(1), dec!(110), Timestamp::from_millis(5)).unwrap();
        assert_eq!(updated.unrealized_pnl, dec!(10));
        assert_eq!(cache.find(&btc, PositionId(1)).unwrap().mark_price, dec!(110));
        assert!(cache.update_marks(&btc, PositionId(9), dec!(110), Timestamp::from_millis(5)).is_none());
    }
}
