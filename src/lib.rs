// perps-venue: simulated perpetual futures venue.
// prices come from an external reference venue, there is no book and no
// counterparty. the engine settles agent orders against those prices, tracks
// leveraged positions and closes them on take profit, stop loss or liquidation.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AgentId, Symbol, Side, Leverage, rounding
//   2.x  clock.rs: time source, system and manual
//   2.1  throttle.rs: per key rate gate
//   3.x  risk.rs: pnl, liquidation price, weighted entry, margin
//   4.x  position.rs: position record, transitions, trigger rules
//   4.1x order.rs: order request, validation, limit crossing
//   5.x  ledger.rs: trades and the audit ledger
//   5.1  wallet.rs: balance, used margin, derived equity
//   6.x  store/: durable record store trait + in memory store
//   7.x  config.rs: engine/feed settings, env presets
//   8.x  engine/: orders, fills, closes, ticks, reports
//   9.x  quote.rs: per symbol market snapshot cache
//   9.1  feed.rs: reference venue events, tick policy, run loop

// core modules
pub mod engine;
pub mod ledger;
pub mod order;
pub mod position;
pub mod risk;
pub mod types;
pub mod wallet;

// market data
pub mod feed;
pub mod quote;

// integration modules
pub mod clock;
pub mod config;
pub mod store;
pub mod throttle;

// re exports for convenience
pub use engine::*;
pub use ledger::*;
pub use order::*;
pub use position::*;
pub use risk::*;
pub use types::*;
pub use wallet::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, Environment, VenueConfig};
pub use feed::{normalize_symbol, FeedConfig, FeedEvent, MarketFeed, TickPolicy};
pub use quote::{Candle, MarketQuote, QuoteCache, QuoteUpdate, RecentTrade};
pub use store::{MemoryStore, PriceSnapshot, RecordStore, StoreError, Write, WriteBatch};
