// 8.0: risk engine. order entry, netting fills, trigger closes and mark refresh
// over externally sourced prices. every money movement is one store batch and
// every mutation for an agent runs under that agent's lock.

mod cache;
mod config;
mod core;
mod orders;
mod positions;
mod reports;
mod results;
mod ticks;

pub use cache::ActivePositionCache;
pub use config::EngineConfig;
pub use core::Engine;
pub use results::{
    AccountOverview, AgentStats, CloseOutcome, ClosedPosition, EngineError, FillAction, FillOutcome, OrderView,
    PositionView, TickSummary,
};
