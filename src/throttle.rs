//! Per key rate gate.
//!
//! Used three ways: trade driven ticks (one per symbol per 500 ms), price snapshot
//! writes (one per symbol per 2 s) and position mark writes (one per position per 5 s).
//! The gate is lossy: a denied call is dropped, not queued.

use crate::types::Timestamp;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
pub struct Throttle<K> {
    interval_ms: i64,
    last_pass: Mutex<HashMap<K, Timestamp>>,
}

impl<K: Eq + Hash> Throttle<K> {
    pub fn new(interval_ms: i64) -> Self {
        Self {
            interval_ms,
            last_pass: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// Returns true and records `now` when `key` has not passed within the interval.
    pub fn try_pass(&self, key: K, now: Timestamp) -> bool {
        let mut last_pass = self.last_pass.lock();
        match last_pass.get(&key) {
            Some(last) if now.millis_since(*last) < self.interval_ms => false,
            _ => {
                last_pass.insert(key, now);
                true
            }
        }
    }

    pub fn forget(&self, key: &K) {
        self.last_pass.lock().remove(key);
    }
}
