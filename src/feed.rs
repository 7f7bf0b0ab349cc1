//! Market feed adapter.
//!
//! Turns normalized reference venue events into quote cache updates and decides
//! which of them tick the engine. Ticker and mark price events tick every time,
//! aggregate trades tick at most once per interval per symbol, klines and book
//! tickers only update the cache. Price snapshots are written to the store on
//! their own per symbol throttle and a failed write is only logged.
//!
//! Transport (websocket, reconnects) stays outside: anything that can push
//! [`FeedEvent`]s into a `tokio::sync::mpsc` channel can drive [`MarketFeed::run`].

use crate::engine::{Engine, EngineError, TickSummary};
use crate::quote::{QuoteUpdate, RecentTrade};
use crate::store::PriceSnapshot;
use crate::throttle::Throttle;
use crate::types::{round_money, round_qty, Symbol, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Minimum gap between trade driven ticks of one symbol.
    pub trade_tick_interval_ms: i64,
    /// Minimum gap between price snapshot writes of one symbol.
    pub snapshot_interval_ms: i64,
    /// Capacity of the event channel handed to the transport.
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            trade_tick_interval_ms: 500,
            snapshot_interval_ms: 2_000,
            channel_capacity: 4_096,
        }
    }
}

/// One event from the reference venue. Symbols are raw, e.g. `BTCUSDT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedEvent {
    Ticker {
        symbol: String,
        last: Decimal,
        high_24h: Decimal,
        low_24h: Decimal,
        volume_24h: Decimal,
        price_change_24h: Decimal,
        price_change_percent_24h: Decimal,
        event_time: Timestamp,
    },
    Kline {
        symbol: String,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        event_time: Timestamp,
    },
    MarkPrice {
        symbol: String,
        mark_price: Decimal,
        index_price: Decimal,
        funding_rate: Decimal,
        event_time: Timestamp,
    },
    AggTrade {
        symbol: String,
        price: Decimal,
        qty: Decimal,
        trade_time: Timestamp,
        buyer_is_maker: bool,
    },
    BookTicker {
        symbol: String,
        bid: Decimal,
        bid_qty: Decimal,
        ask: Decimal,
        ask_qty: Decimal,
        event_time: Option<Timestamp>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPolicy {
    Immediate,
    Throttled,
    Skip,
}

/// `BTCUSDT` -> `BTCUSD`. The venue quotes everything in USD.
pub fn normalize_symbol(raw: &str) -> Symbol {
    Symbol::new(raw.trim().to_ascii_uppercase().replacen("USDT", "USD", 1))
}

impl FeedEvent {
    pub fn raw_symbol(&self) -> &str {
        match self {
            FeedEvent::Ticker { symbol, .. }
            | FeedEvent::Kline { symbol, .. }
            | FeedEvent::MarkPrice { symbol, .. }
            | FeedEvent::AggTrade { symbol, .. }
            | FeedEvent::BookTicker { symbol, .. } => symbol,
        }
    }

    pub fn symbol(&self) -> Symbol {
        normalize_symbol(self.raw_symbol())
    }

    pub fn tick_policy(&self) -> TickPolicy {
        match self {
            FeedEvent::Ticker { .. } | FeedEvent::MarkPrice { .. } => TickPolicy::Immediate,
            FeedEvent::AggTrade { .. } => TickPolicy::Throttled,
            FeedEvent::Kline { .. } | FeedEvent::BookTicker { .. } => TickPolicy::Skip,
        }
    }

    /// Normalized symbol and the rounded partial quote this event carries.
    pub fn into_update(self) -> (Symbol, QuoteUpdate) {
        let symbol = self.symbol();
        let update = match self {
            FeedEvent::Ticker {
                last,
                high_24h,
                low_24h,
                volume_24h,
                price_change_24h,
                price_change_percent_24h,
                event_time,
                ..
            } => QuoteUpdate {
                last: Some(round_money(last)),
                high_24h: Some(round_money(high_24h)),
                low_24h: Some(round_money(low_24h)),
                volume_24h: Some(round_money(volume_24h)),
                price_change_24h: Some(round_money(price_change_24h)),
                price_change_percent_24h: Some(round_money(price_change_percent_24h)),
                event_time: Some(event_time),
                ..QuoteUpdate::default()
            },
            FeedEvent::Kline {
                open,
                high,
                low,
                close,
                volume,
                event_time,
                ..
            } => QuoteUpdate {
                open_1h: Some(round_money(open)),
                high_1h: Some(round_money(high)),
                low_1h: Some(round_money(low)),
                close_1h: Some(round_money(close)),
                volume_1h: Some(round_qty(volume)),
                event_time: Some(event_time),
                ..QuoteUpdate::default()
            },
            FeedEvent::MarkPrice {
                mark_price,
                index_price,
                funding_rate,
                event_time,
                ..
            } => QuoteUpdate {
                mark_price: Some(round_money(mark_price)),
                index_price: Some(round_money(index_price)),
                funding_rate: Some(round_qty(funding_rate)),
                event_time: Some(event_time),
                ..QuoteUpdate::default()
            },
            // trades only feed the ring, `last` comes from the ticker
            FeedEvent::AggTrade {
                price,
                qty,
                trade_time,
                buyer_is_maker,
                ..
            } => QuoteUpdate {
                recent_trades: vec![RecentTrade {
                    price: round_money(price),
                    qty: round_qty(qty),
                    time: trade_time,
                    buyer_is_maker,
                }],
                ..QuoteUpdate::default()
            },
            FeedEvent::BookTicker {
                bid,
                bid_qty,
                ask,
                ask_qty,
                event_time,
                ..
            } => QuoteUpdate {
                bid: Some(round_money(bid)),
                ask: Some(round_money(ask)),
                bid_qty: Some(round_qty(bid_qty)),
                ask_qty: Some(round_qty(ask_qty)),
                event_time,
                ..QuoteUpdate::default()
            },
        };
        (symbol, update)
    }
}

/// What ingesting one event left to do.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    pub symbol: Symbol,
    pub tick: bool,
    pub snapshot: Option<PriceSnapshot>,
}

#[derive(Debug)]
pub struct MarketFeed {
    engine: Arc<Engine>,
    trade_ticks: Throttle<Symbol>,
    snapshots: Throttle<Symbol>,
}

impl MarketFeed {
    pub fn new(engine: Arc<Engine>, config: &FeedConfig) -> Self {
        Self {
            engine,
            trade_ticks: Throttle::new(config.trade_tick_interval_ms),
            snapshots: Throttle::new(config.snapshot_interval_ms),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Merges the event into the quote cache and applies both throttles.
    pub fn ingest(&self, event: FeedEvent) -> Ingested {
        let policy = event.tick_policy();
        let (symbol, update) = event.into_update();
        self.engine.update_quote(&symbol, update);

        let now = self.engine.now();
        let tick = match policy {
            TickPolicy::Immediate => true,
            TickPolicy::Throttled => self.trade_ticks.try_pass(symbol.clone(), now),
            TickPolicy::Skip => false,
        };

        let snapshot = if self.snapshots.try_pass(symbol.clone(), now) {
            self.engine.quote(&symbol).map(|quote| PriceSnapshot {
                symbol: symbol.clone(),
                bid: quote.bid,
                ask: quote.ask,
                last: quote.last,
                mark_price: quote.mark_price,
                updated_at: now,
            })
        } else {
            None
        };

        Ingested { symbol, tick, snapshot }
    }

    /// Ingests one event and runs whatever it triggered inline.
    pub async fn handle(&self, event: FeedEvent) -> Result<Option<TickSummary>, EngineError> {
        let ingested = self.ingest(event);
        if let Some(snapshot) = ingested.snapshot {
            write_snapshot(&self.engine, snapshot).await;
        }
        if ingested.tick {
            return self.engine.on_tick(&ingested.symbol).await.map(Some);
        }
        Ok(None)
    }

    /// Consumes events until every sender is dropped. Ticks and snapshot writes are
    /// spawned so a slow tick never holds up quote ingestion.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<FeedEvent>) {
        info!("market feed started");
        while let Some(event) = events.recv().await {
            let ingested = self.ingest(event);

            if let Some(snapshot) = ingested.snapshot {
                let engine = Arc::clone(&self.engine);
                tokio::spawn(async move { write_snapshot(&engine, snapshot).await });
            }

            if ingested.tick {
                let engine = Arc::clone(&self.engine);
                let symbol = ingested.symbol;
                tokio::spawn(async move {
                    match engine.on_tick(&symbol).await {
                        Ok(summary) if summary.fills + summary.closes > 0 => {
                            debug!(symbol = %symbol, fills = summary.fills, closes = summary.closes, "tick settled");
                        }
                        Ok(_) => {}
                        Err(err) => warn!(symbol = %symbol, error = %err, "engine tick failed"),
                    }
                });
            }
        }
        info!("market feed channel closed");
    }
}

async fn write_snapshot(engine: &Engine, snapshot: PriceSnapshot) {
    let symbol = snapshot.symbol.clone();
    if let Err(err) = engine.store().upsert_price_snapshot(snapshot).await {
        debug!(symbol = %symbol, error = %err, "price snapshot write failed");
    }
}
