//! Quote cache: latest normalized market snapshot per symbol.
//!
//! Pure data store. The feed merges partial updates in, the engine and the read
//! paths copy snapshots out. A missing symbol means no quote has ever arrived,
//! which the engine treats as "no price, no action".

use crate::types::{Symbol, Timestamp};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Default bound on the recent trade ring.
pub const MAX_RECENT_TRADES: usize = 50;

/// One aggregate trade printed by the reference venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentTrade {
    pub price: Decimal,
    pub qty: Decimal,
    pub time: Timestamp,
    pub buyer_is_maker: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub symbol: Symbol,
    pub bid: Decimal,
    pub ask: Decimal,
    pub bid_qty: Decimal,
    pub ask_qty: Decimal,
    pub last: Decimal,
    pub mark_price: Decimal,
    pub index_price: Decimal,
    pub funding_rate: Decimal,
    pub open_interest: Decimal,
    pub high_24h: Decimal,
    pub low_24h: Decimal,
    pub volume_24h: Decimal,
    pub price_change_24h: Decimal,
    pub price_change_percent_24h: Decimal,
    pub open_1h: Decimal,
    pub high_1h: Decimal,
    pub low_1h: Decimal,
    pub close_1h: Decimal,
    pub volume_1h: Decimal,
    /// Newest first.
    pub recent_trades: VecDeque<RecentTrade>,
    pub timestamp: Timestamp,
}

impl MarketQuote {
    pub fn empty(symbol: Symbol, timestamp: Timestamp) -> Self {
        Self {
            symbol,
            bid: Decimal::ZERO,
            ask: Decimal::ZERO,
            bid_qty: Decimal::ZERO,
            ask_qty: Decimal::ZERO,
            last: Decimal::ZERO,
            mark_price: Decimal::ZERO,
            index_price: Decimal::ZERO,
            funding_rate: Decimal::ZERO,
            open_interest: Decimal::ZERO,
            high_24h: Decimal::ZERO,
            low_24h: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
            price_change_24h: Decimal::ZERO,
            price_change_percent_24h: Decimal::ZERO,
            open_1h: Decimal::ZERO,
            high_1h: Decimal::ZERO,
            low_1h: Decimal::ZERO,
            close_1h: Decimal::ZERO,
            volume_1h: Decimal::ZERO,
            recent_trades: VecDeque::new(),
            timestamp,
        }
    }

    // mark falls back to last while no mark price event has arrived
    pub fn effective_mark(&self) -> Decimal {
        if self.mark_price.is_zero() {
            self.last
        } else {
            self.mark_price
        }
    }

    pub fn has_last(&self) -> bool {
        !self.last.is_zero()
    }

    pub fn candle(&self) -> Candle {
        Candle {
            open: self.open_1h,
            high: self.high_1h,
            low: self.low_1h,
            close: self.close_1h,
            volume: self.volume_1h,
            timestamp: self.timestamp,
        }
    }
}

/// The 1h OHLCV window tracked per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: Timestamp,
}

/// Partial quote. Only the `Some` fields are merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteUpdate {
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub bid_qty: Option<Decimal>,
    pub ask_qty: Option<Decimal>,
    pub last: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub index_price: Option<Decimal>,
    pub funding_rate: Option<Decimal>,
    pub open_interest: Option<Decimal>,
    pub high_24h: Option<Decimal>,
    pub low_24h: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
    pub price_change_24h: Option<Decimal>,
    pub price_change_percent_24h: Option<Decimal>,
    pub open_1h: Option<Decimal>,
    pub high_1h: Option<Decimal>,
    pub low_1h: Option<Decimal>,
    pub close_1h: Option<Decimal>,
    pub volume_1h: Option<Decimal>,
    /// Newest first, prepended to the ring.
    pub recent_trades: Vec<RecentTrade>,
    pub event_time: Option<Timestamp>,
}

impl QuoteUpdate {
    pub fn last(price: Decimal) -> Self {
        Self {
            last: Some(price),
            ..Self::default()
        }
    }

    pub fn with_mark(mut self, mark_price: Decimal) -> Self {
        self.mark_price = Some(mark_price);
        self
    }

    pub fn with_event_time(mut self, event_time: Timestamp) -> Self {
        self.event_time = Some(event_time);
        self
    }

    fn merge_into(self, quote: &mut MarketQuote, now: Timestamp, max_trades: usize) {
        fn set(slot: &mut Decimal, value: Option<Decimal>) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        set(&mut quote.bid, self.bid);
        set(&mut quote.ask, self.ask);
        set(&mut quote.bid_qty, self.bid_qty);
        set(&mut quote.ask_qty, self.ask_qty);
        set(&mut quote.last, self.last);
        set(&mut quote.mark_price, self.mark_price);
        set(&mut quote.index_price, self.index_price);
        set(&mut quote.funding_rate, self.funding_rate);
        set(&mut quote.open_interest, self.open_interest);
        set(&mut quote.high_24h, self.high_24h);
        set(&mut quote.low_24h, self.low_24h);
        set(&mut quote.volume_24h, self.volume_24h);
        set(&mut quote.price_change_24h, self.price_change_24h);
        set(&mut quote.price_change_percent_24h, self.price_change_percent_24h);
        set(&mut quote.open_1h, self.open_1h);
        set(&mut quote.high_1h, self.high_1h);
        set(&mut quote.low_1h, self.low_1h);
        set(&mut quote.close_1h, self.close_1h);
        set(&mut quote.volume_1h, self.volume_1h);

        for trade in self.recent_trades.into_iter().rev() {
            quote.recent_trades.push_front(trade);
        }
        quote.recent_trades.truncate(max_trades);

        quote.timestamp = self.event_time.unwrap_or(now);
    }
}

#[derive(Debug)]
pub struct QuoteCache {
    quotes: RwLock<HashMap<Symbol, MarketQuote>>,
    max_recent_trades: usize,
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new(MAX_RECENT_TRADES)
    }
}

impl QuoteCache {
    pub fn new(max_recent_trades: usize) -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
            max_recent_trades,
        }
    }

    /// Merge `update` into the snapshot for `symbol` as one critical section.
    pub fn update(&self, symbol: &Symbol, update: QuoteUpdate, now: Timestamp) {
        let mut quotes = self.quotes.write();
        let quote = quotes
            .entry(symbol.clone())
            .or_insert_with(|| MarketQuote::empty(symbol.clone(), now));
        update.merge_into(quote, now, self.max_recent_trades);
    }

    pub fn get(&self, symbol: &Symbol) -> Option<MarketQuote> {
        self.quotes.read().get(symbol).cloned()
    }

    pub fn get_all(&self) -> Vec<MarketQuote> {
        let mut all: Vec<MarketQuote> = self.quotes.read().values().cloned().collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    pub fn len(&self) -> usize {
        self.quotes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(price: Decimal, time: i64) -> RecentTrade {
        RecentTrade {
            price,
            qty: dec!(0.01),
            time: Timestamp::from_millis(time),
            buyer_is_maker: false,
        }
    }

    #[test]
    fn absent_until_first_update() {
        let cache = QuoteCache::default();
        let btc = Symbol::from("BTCUSD");
        assert!(cache.get(&btc).is_none());

        cache.update(&btc, QuoteUpdate::last(dec!(50000)), Timestamp::from_millis(1));
        let quote = cache.get(&btc).unwrap();
        assert_eq!(quote.last, dec!(50000));
        assert_eq!(quote.bid, Decimal::ZERO);
    }

    #[test]
    fn partial_updates_merge_field_by_field() {
        let cache = QuoteCache::default();
        let btc = Symbol::from("BTCUSD");

        cache.update(&btc, QuoteUpdate::last(dec!(50000)), Timestamp::from_millis(1));
        cache.update(
            &btc,
            QuoteUpdate {
                mark_price: Some(dec!(50010)),
                funding_rate: Some(dec!(0.0001)),
                ..QuoteUpdate::default()
            },
            Timestamp::from_millis(2),
        );

        let quote = cache.get(&btc).unwrap();
        assert_eq!(quote.last, dec!(50000));
        assert_eq!(quote.mark_price, dec!(50010));
        assert_eq!(quote.funding_rate, dec!(0.0001));
        assert_eq!(quote.timestamp, Timestamp::from_millis(2));
    }

    #[test]
    fn event_time_wins_over_wall_clock() {
        let cache = QuoteCache::default();
        let btc = Symbol::from("BTCUSD");

        let update = QuoteUpdate::last(dec!(1)).with_event_time(Timestamp::from_millis(77));
        cache.update(&btc, update, Timestamp::from_millis(1_000));
        assert_eq!(cache.get(&btc).unwrap().timestamp, Timestamp::from_millis(77));
    }

    #[test]
    fn trade_ring_is_newest_first_and_bounded() {
        let cache = QuoteCache::new(3);
        let btc = Symbol::from("BTCUSD");

        for i in 0..5 {
            let update = QuoteUpdate {
                recent_trades: vec![trade(Decimal::from(i), i)],
                ..QuoteUpdate::default()
            };
            cache.update(&btc, update, Timestamp::from_millis(i));
        }

        let quote = cache.get(&btc).unwrap();
        let prices: Vec<Decimal> = quote.recent_trades.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![dec!(4), dec!(3), dec!(2)]);
    }

    #[test]
    fn batch_of_trades_keeps_its_order_at_the_front() {
        let cache = QuoteCache::default();
        let eth = Symbol::from("ETHUSD");

        cache.update(
            &eth,
            QuoteUpdate { recent_trades: vec![trade(dec!(1), 1)], ..QuoteUpdate::default() },
            Timestamp::from_millis(1),
        );
        cache.update(
            &eth,
            QuoteUpdate {
                recent_trades: vec![trade(dec!(3), 3), trade(dec!(2), 2)],
                ..QuoteUpdate::default()
            },
            Timestamp::from_millis(3),
        );

        let prices: Vec<Decimal> = cache.get(&eth).unwrap().recent_trades.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![dec!(3), dec!(2), dec!(1)]);
    }

    #[test]
    fn effective_mark_falls_back_to_last() {
        let mut quote = MarketQuote::empty(Symbol::from("BTCUSD"), Timestamp::from_millis(0));
        quote.last = dec!(100);
        assert_eq!(quote.effective_mark(), dec!(100));
        quote.mark_price = dec!(99);
        assert_eq!(quote.effective_mark(), dec!(99));
    }

    #[test]
    fn get_all_is_sorted_by_symbol() {
        let cache = QuoteCache::default();
        cache.update(&Symbol::from("ETHUSD"), QuoteUpdate::last(dec!(1)), Timestamp::from_millis(0));
        cache.update(&Symbol::from("BTCUSD"), QuoteUpdate::last(dec!(2)), Timestamp::from_millis(0));

        let symbols: Vec<String> = cache.get_all().into_iter().map(|q| q.symbol.0).collect();
        assert_eq!(symbols, vec!["BTCUSD".to_string(), "ETHUSD".to_string()]);
    }
}
