//! Cache Module
//!
//! The cache engine: cache-aside access to a prefixed key-value namespace
//! with TTLs, batch operations, counters and shared hit/miss statistics.

mod service;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use service::{CacheOptions, CacheService};
pub use stats::{hit_ratio, CacheStats};
