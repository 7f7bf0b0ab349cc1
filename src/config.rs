// 7.0 config.rs: all settings in one place. engine limits, feed throttles, symbols.
// 7.1 presets per environment, validate() before handing anything to the engine.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::EngineConfig;
use crate::feed::FeedConfig;
use crate::types::Symbol;

/// Environment variable naming a JSON config file for the simulator.
pub const CONFIG_ENV_VAR: &str = "VENUE_CONFIG";

pub const DEFAULT_SYMBOLS: [&str; 8] = [
    "BTCUSD", "ETHUSD", "XRPUSD", "DOGEUSD", "PEPEUSD", "SOLUSD", "BNBUSD", "TRONUSD",
];

// The complete venue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    pub engine: EngineConfig,
    pub feed: FeedConfig,
    // Normalized symbols the feed subscribes to
    pub symbols: Vec<Symbol>,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            feed: FeedConfig::default(),
            symbols: DEFAULT_SYMBOLS.iter().map(|s| Symbol::from(*s)).collect(),
        }
    }
}

impl VenueConfig {
    // Fast throttles and a small symbol set for local runs
    pub fn development() -> Self {
        let mut config = Self::default();
        config.engine.pnl_persist_interval_ms = 1_000;
        config.feed.trade_tick_interval_ms = 100;
        config.feed.snapshot_interval_ms = 500;
        config.symbols = vec![Symbol::from("BTCUSD"), Symbol::from("ETHUSD")];
        config
    }

    // What the simulator binary runs with
    pub fn simulation() -> Self {
        let mut config = Self::default();
        config.engine.starting_balance = dec!(10000);
        config.feed.channel_capacity = 1_024;
        config
    }

    // Conservative leverage cap, default throttles
    pub fn production() -> Self {
        let mut config = Self::default();
        config.engine.max_leverage = dec!(10);
        config
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }

    /// Reads the file named by [`CONFIG_ENV_VAR`], or falls back to `fallback`.
    pub fn from_env_or(fallback: Self) -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()),
            _ => {
                fallback.validate()?;
                Ok(fallback)
            }
        }
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        if engine.max_leverage < Decimal::ONE {
            return Err(ConfigError::InvalidEngine {
                reason: "max leverage must be at least 1x".to_string(),
            });
        }
        if engine.starting_balance < Decimal::ZERO {
            return Err(ConfigError::InvalidEngine {
                reason: "starting balance cannot be negative".to_string(),
            });
        }
        if engine.pnl_persist_interval_ms < 0 {
            return Err(ConfigError::InvalidEngine {
                reason: "pnl persist interval cannot be negative".to_string(),
            });
        }
        if engine.recent_trade_ring == 0 {
            return Err(ConfigError::InvalidEngine {
                reason: "recent trade ring needs room for one trade".to_string(),
            });
        }

        if self.feed.trade_tick_interval_ms < 0 || self.feed.snapshot_interval_ms < 0 {
            return Err(ConfigError::InvalidFeed {
                reason: "throttle intervals cannot be negative".to_string(),
            });
        }
        if self.feed.channel_capacity == 0 {
            return Err(ConfigError::InvalidFeed {
                reason: "channel capacity must be positive".to_string(),
            });
        }

        if self.symbols.is_empty() {
            return Err(ConfigError::InvalidSymbols {
                reason: "no symbols configured".to_string(),
            });
        }
        if let Some(bad) = self.symbols.iter().find(|s| s.as_str().is_empty() || s.as_str().ends_with("USDT")) {
            return Err(ConfigError::InvalidSymbols {
                reason: format!("symbol {bad:?} is not normalized"),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid engine config: {reason}")]
    InvalidEngine { reason: String },

    #[error("Invalid feed config: {reason}")]
    InvalidFeed { reason: String },

    #[error("Invalid symbols: {reason}")]
    InvalidSymbols { reason: String },

    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Cannot read {path}: {reason}")]
    Io { path: String, reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Simulation,
    Production,
}

impl Environment {
    pub fn config(&self) -> VenueConfig {
        match self {
            Environment::Development => VenueConfig::development(),
            Environment::Simulation => VenueConfig::simulation(),
            Environment::Production => VenueConfig::production(),
        }
    }
}
