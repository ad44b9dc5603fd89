//! Store Module
//!
//! The key-value protocol the cache engine is written against, with an
//! in-process backend and a Redis backend.
//!
//! TTL semantics follow Redis: `ttl` returns `-2` for a missing key and `-1`
//! for a key without expiry.

mod entry;
mod memory;
mod pattern;
mod redis_store;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{CacheError, Result};

pub use entry::{current_timestamp_ms, StoreEntry, StoredValue};
pub use memory::MemoryStore;
pub use pattern::GlobPattern;
pub use redis_store::RedisStore;

/// `ttl` result for a key that does not exist.
pub const TTL_MISSING: i64 = -2;
/// `ttl` result for a key that exists without an expiry.
pub const TTL_PERSISTENT: i64 = -1;

/// Longest accepted expiry. Redis rejects anything whose millisecond form
/// overflows an `i64`.
pub const MAX_TTL_SECS: u64 = (i64::MAX / 1000) as u64;

/// Rejects expiries Redis would refuse.
pub fn check_ttl(ttl_secs: u64) -> Result<()> {
    if ttl_secs > MAX_TTL_SECS {
        return Err(CacheError::InvalidArgument(format!(
            "ttl {} exceeds the maximum of {} seconds",
            ttl_secs, MAX_TTL_SECS
        )));
    }
    Ok(())
}

// == Key Value Store ==
/// Minimal key-value store contract consumed by `CacheService` and the
/// rate limiter. Implementations must make `incr_by` and `hincr_by` atomic.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Backend name, for logs and health reports.
    fn backend(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes without expiry.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Writes with an expiry in seconds.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// Deletes the given keys and returns how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Re-arms the expiry of an existing key. Returns false when the key is absent.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool>;

    async fn ttl(&self, key: &str) -> Result<i64>;

    /// All keys matching a glob pattern (`*`, `?`, `[...]`, `\` escapes).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Batch read; missing keys yield `None` at their position.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Batch write in a single round-trip, applying the same expiry to every entry.
    async fn mset(&self, entries: &[(String, String)], ttl_secs: Option<u64>) -> Result<()>;

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64>;

    /// `incr_by` and `expire` as one atomic step, so a counter never outlives
    /// its window.
    async fn incr_with_expiry(&self, key: &str, amount: i64, ttl_secs: u64) -> Result<i64>;

    async fn hincr_by(&self, key: &str, field: &str, amount: i64) -> Result<i64>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Diagnostics text in the `INFO` format (`field:value` lines).
    async fn info(&self, section: &str) -> Result<String>;

    async fn dbsize(&self) -> Result<u64>;

    /// Removes every key of this database.
    async fn flushdb(&self) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    /// Releases the underlying connection. Later commands fail.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Extracts a single `field:value` line from `INFO` output.
pub fn info_field(info: &str, field: &str) -> Option<String> {
    info.lines().find_map(|line| {
        let (name, value) = line.trim().split_once(':')?;
        (name == field).then(|| value.trim().to_string())
    })
}
