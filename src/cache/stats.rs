//! Cache Statistics Module
//!
//! Hit/miss counters live in one hash in the store so every process sharing
//! the store reports the same numbers.

use std::collections::HashMap;

use serde::Serialize;

/// Hash field holding the hit counter.
pub const HITS_FIELD: &str = "hits";
/// Hash field holding the miss counter.
pub const MISSES_FIELD: &str = "misses";

// == Cache Stats ==
/// Snapshot of cache performance and store diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of `get` calls that found a value
    pub hits: u64,
    /// Number of `get` calls that found nothing (or failed)
    pub misses: u64,
    /// Hit percentage, rounded to two decimals
    pub hit_ratio: f64,
    /// Keys in the active database
    pub total_keys: u64,
    /// Human readable memory usage reported by the store
    pub memory_usage: String,
}

impl CacheStats {
    // == Constructor ==
    /// Builds a snapshot from the raw counter hash and store diagnostics.
    pub fn from_counters(
        counters: &HashMap<String, String>,
        total_keys: u64,
        memory_usage: impl Into<String>,
    ) -> Self {
        let read = |field: &str| {
            counters
                .get(field)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0)
        };
        let hits = read(HITS_FIELD);
        let misses = read(MISSES_FIELD);

        Self {
            hits,
            misses,
            hit_ratio: hit_ratio(hits, misses),
            total_keys,
            memory_usage: memory_usage.into(),
        }
    }

    // == Hit Rate ==
    /// Fraction of lookups that hit, in `0.0..=1.0`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// `hits / (hits + misses) * 100`, rounded to two decimals, zero without data.
pub fn hit_ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    let percent = hits as f64 / total as f64 * 100.0;
    (percent * 100.0).round() / 100.0
}
