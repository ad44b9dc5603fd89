//! Cache Service Module
//!
//! Cache-aside facade over a `KeyValueStore`: prefixed keys, optional TTL,
//! JSON encoding, batch operations, counters and hit/miss statistics.
//!
//! Reads never fail the caller. A store error during `get` is logged and
//! reported as a miss, because the cache is an optimization and not a
//! dependency of the request path. Writes report their errors.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::stats::{CacheStats, HITS_FIELD, MISSES_FIELD};
use crate::error::{CacheError, Result};
use crate::store::{check_ttl, info_field, GlobPattern, KeyValueStore};

const STATS_SUFFIX: &str = "__stats";

// == Cache Options ==
/// Per-call options.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOptions {
    /// Seconds to live. `None` or `0` persists until deleted.
    pub ttl: Option<u64>,
    /// Overrides the service prefix for this call
    pub prefix: Option<String>,
    /// JSON-encode values. When false, string values are stored verbatim.
    pub serialize: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            prefix: None,
            serialize: true,
        }
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Stores strings as-is instead of as JSON text.
    pub fn raw(mut self) -> Self {
        self.serialize = false;
        self
    }

    /// Positive TTL to write with, or `None` to persist. Refuses expiries the
    /// store cannot represent.
    fn effective_ttl(&self) -> Result<Option<u64>> {
        match self.ttl.filter(|ttl| *ttl > 0) {
            Some(ttl) => {
                check_ttl(ttl)?;
                Ok(Some(ttl))
            }
            None => Ok(None),
        }
    }
}

// == Cache Service ==
/// The cache engine. Cheap to clone; all state lives in the store.
#[derive(Clone)]
pub struct CacheService {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    stats_key: String,
}

impl CacheService {
    // == Constructor ==
    /// Creates a service writing every key under `prefix`.
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            stats_key: format!("{}{}", prefix, STATS_SUFFIX),
            store,
            prefix,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full store key for a logical key.
    pub fn key(&self, key: &str, options: &CacheOptions) -> String {
        format!(
            "{}{}",
            options.prefix.as_deref().unwrap_or(&self.prefix),
            key
        )
    }

    fn require_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(CacheError::InvalidArgument("key cannot be empty".into()));
        }
        Ok(())
    }

    // == Get ==
    /// Reads and decodes a value. Misses, undecodable payloads and store
    /// failures all return `None`; each call records exactly one hit or miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, options: &CacheOptions) -> Option<T> {
        let full_key = self.key(key, options);

        let value = match self.store.get(&full_key).await {
            Ok(Some(raw)) => match decode(raw, options.serialize) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", full_key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", full_key, e);
                None
            }
        };

        if value.is_some() {
            debug!("Cache hit for key: {}", full_key);
            self.record(HITS_FIELD).await;
        } else {
            debug!("Cache miss for key: {}", full_key);
            self.record(MISSES_FIELD).await;
        }
        value
    }

    /// Reads a value without touching statistics and reports store errors.
    pub async fn peek<T: DeserializeOwned>(
        &self,
        key: &str,
        options: &CacheOptions,
    ) -> Result<Option<T>> {
        let full_key = self.key(key, options);
        match self.store.get(&full_key).await? {
            Some(raw) => decode(raw, options.serialize).map(Some),
            None => Ok(None),
        }
    }

    // == Get With Fallback ==
    /// Cache-aside read: returns the cached value, or runs `fetch`, stores its
    /// result with the same options and returns it.
    ///
    /// Errors from `fetch` are returned unchanged. Failures to populate the
    /// cache are logged only. Concurrent misses on one key each run `fetch`.
    pub async fn get_with_fallback<T, F, Fut, E>(
        &self,
        key: &str,
        fetch: F,
        options: &CacheOptions,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key, options).await {
            return Ok(cached);
        }

        let fresh = fetch().await?;
        if let Err(e) = self.set(key, &fresh, options).await {
            warn!("Failed to populate cache for {}: {}", key, e);
        }
        Ok(fresh)
    }

    // == Set ==
    /// Encodes and writes a value. A positive TTL writes with expiry.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: &CacheOptions,
    ) -> Result<()> {
        Self::require_key(key)?;
        let full_key = self.key(key, options);
        let encoded = encode(value, options.serialize)?;

        let written = match options.effective_ttl()? {
            Some(ttl) => self.store.set_ex(&full_key, &encoded, ttl).await,
            None => self.store.set(&full_key, &encoded).await,
        };
        written.map_err(write_error)?;

        debug!("Set cache key: {} with TTL: {:?}", full_key, options.ttl);
        Ok(())
    }

    // == Delete ==
    /// Returns whether a key was removed.
    pub async fn del(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        let removed = self.store.del(&[self.key(key, options)]).await?;
        Ok(removed > 0)
    }

    pub async fn exists(&self, key: &str, options: &CacheOptions) -> Result<bool> {
        self.store.exists(&self.key(key, options)).await
    }

    /// Remaining seconds; `-2` when absent, `-1` when persistent.
    pub async fn ttl(&self, key: &str, options: &CacheOptions) -> Result<i64> {
        self.store.ttl(&self.key(key, options)).await
    }

    /// Re-arms the expiry of an existing key; false when the key is absent.
    pub async fn expire(&self, key: &str, seconds: u64, options: &CacheOptions) -> Result<bool> {
        Self::require_key(key)?;
        if seconds == 0 {
            return Err(CacheError::InvalidArgument(
                "expire requires a positive number of seconds".into(),
            ));
        }
        check_ttl(seconds)?;
        self.store.expire(&self.key(key, options), seconds).await
    }

    // == Invalidate Pattern ==
    /// Deletes every key under `{prefix}{pattern}` in one batch and returns
    /// how many were removed. Cost grows with the keyspace under the prefix.
    pub async fn invalidate_pattern(&self, pattern: &str, options: &CacheOptions) -> Result<u64> {
        if pattern.is_empty() {
            return Err(CacheError::InvalidArgument("pattern cannot be empty".into()));
        }
        let full_pattern = self.key(pattern, options);
        // Both backends must refuse the same malformed patterns
        GlobPattern::new(&full_pattern)?;
        let keys: Vec<String> = self
            .store
            .keys(&full_pattern)
            .await?
            .into_iter()
            .filter(|key| *key != self.stats_key)
            .collect();
        if keys.is_empty() {
            return Ok(0);
        }

        let removed = self.store.del(&keys).await?;
        debug!("Invalidated {} keys matching {}", removed, pattern);
        Ok(removed)
    }

    // == Batch Operations ==
    /// Reads many keys in one round-trip. Absent or undecodable entries
    /// yield `None` in their position; a store failure yields all `None`.
    pub async fn mget<T: DeserializeOwned>(
        &self,
        keys: &[&str],
        options: &CacheOptions,
    ) -> Vec<Option<T>> {
        let full_keys: Vec<String> = keys.iter().map(|k| self.key(k, options)).collect();
        match self.store.mget(&full_keys).await {
            Ok(values) => values
                .into_iter()
                .map(|raw| raw.and_then(|raw| decode(raw, options.serialize).ok()))
                .collect(),
            Err(e) => {
                warn!("Batch cache read failed: {}", e);
                keys.iter().map(|_| None).collect()
            }
        }
    }

    /// Writes many entries in one round-trip with a shared TTL.
    pub async fn mset<T: Serialize>(
        &self,
        entries: &HashMap<String, T>,
        options: &CacheOptions,
    ) -> Result<()> {
        let ttl = options.effective_ttl()?;
        let mut batch = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            Self::require_key(key)?;
            batch.push((self.key(key, options), encode(value, options.serialize)?));
        }
        self.store
            .mset(&batch, ttl)
            .await
            .map_err(write_error)
    }

    // == Increment ==
    /// Atomically adds `amount` to a numeric key and returns the new value.
    pub async fn incr(&self, key: &str, amount: i64, options: &CacheOptions) -> Result<i64> {
        Self::require_key(key)?;
        self.store.incr_by(&self.key(key, options), amount).await
    }

    /// `incr` that also (re)arms the key's expiry in the same atomic step.
    pub async fn incr_with_expiry(
        &self,
        key: &str,
        amount: i64,
        seconds: u64,
        options: &CacheOptions,
    ) -> Result<i64> {
        Self::require_key(key)?;
        if seconds == 0 {
            return Err(CacheError::InvalidArgument(
                "expire requires a positive number of seconds".into(),
            ));
        }
        check_ttl(seconds)?;
        self.store
            .incr_with_expiry(&self.key(key, options), amount, seconds)
            .await
    }

    // == Stats ==
    async fn record(&self, field: &str) {
        if let Err(e) = self.store.hincr_by(&self.stats_key, field, 1).await {
            debug!("Could not record cache {}: {}", field, e);
        }
    }

    /// Hit/miss counters plus key count and memory usage of the store.
    pub async fn get_stats(&self) -> Result<CacheStats> {
        let counters = self.store.hgetall(&self.stats_key).await?;
        let total_keys = self.store.dbsize().await?;
        let info = self.store.info("memory").await?;
        let memory = info_field(&info, "used_memory_human").unwrap_or_else(|| "unknown".into());

        Ok(CacheStats::from_counters(&counters, total_keys, memory))
    }

    /// Resets hit/miss counters without touching cached data.
    pub async fn clear_stats(&self) -> Result<()> {
        self.store.del(&[self.stats_key.clone()]).await?;
        Ok(())
    }

    /// Removes every key in the active database. Destructive; meant for tests
    /// and operations.
    pub async fn flush(&self) -> Result<()> {
        warn!("Flushing {} store", self.store.backend());
        self.store.flushdb().await
    }
}

/// Store failures surface as write errors; caller mistakes pass through.
fn write_error(err: CacheError) -> CacheError {
    match err {
        CacheError::StoreWrite(_) => err,
        other if other.is_infrastructure() => CacheError::StoreWrite(other.to_string()),
        other => other,
    }
}

fn encode<T: Serialize + ?Sized>(value: &T, serialize: bool) -> Result<String> {
    if !serialize {
        if let Value::String(raw) = serde_json::to_value(value)? {
            return Ok(raw);
        }
    }
    Ok(serde_json::to_string(value)?)
}

fn decode<T: DeserializeOwned>(raw: String, serialize: bool) -> Result<T> {
    if serialize {
        return Ok(serde_json::from_str(&raw)?);
    }
    // Raw strings first; non-string values were still written as JSON
    match serde_json::from_value(Value::String(raw.clone())) {
        Ok(value) => Ok(value),
        Err(_) => Ok(serde_json::from_str(&raw)?),
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::FlakyStore;
    use crate::store::{MemoryStore, MAX_TTL_SECS};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Workout {
        id: u32,
        name: String,
        exercises: Vec<String>,
    }

    fn service() -> CacheService {
        CacheService::new(Arc::new(MemoryStore::new()), "test:")
    }

    fn opts() -> CacheOptions {
        CacheOptions::default()
    }

    fn leg_day() -> Workout {
        Workout {
            id: 7,
            name: "Leg day".into(),
            exercises: vec!["squat".into(), "lunge".into()],
        }
    }

    #[tokio::test]
    async fn test_set_and_get_round_trip() {
        let cache = service();
        cache.set("workout:7", &leg_day(), &opts()).await.unwrap();

        let read: Option<Workout> = cache.get("workout:7", &opts()).await;
        assert_eq!(read, Some(leg_day()));
        assert!(cache.store().exists("test:workout:7").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_with_ttl_and_without() {
        let cache = service();
        cache.set("a", &1, &opts().with_ttl(60)).await.unwrap();
        cache.set("b", &2, &opts().with_ttl(0)).await.unwrap();

        let ttl = cache.ttl("a", &opts()).await.unwrap();
        assert!((59..=60).contains(&ttl));
        assert_eq!(cache.ttl("b", &opts()).await.unwrap(), -1);
        assert_eq!(cache.ttl("missing", &opts()).await.unwrap(), -2);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = service();
        cache.set("short", &"v", &opts().with_ttl(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(cache.get::<String>("short", &opts()).await, None);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_invalid_argument() {
        let cache = service();
        let huge = opts().with_ttl(u64::MAX);
        assert!(matches!(
            cache.set("k", &1, &huge).await,
            Err(CacheError::InvalidArgument(_))
        ));

        let mut entries = HashMap::new();
        entries.insert("m".to_string(), 1);
        assert!(matches!(
            cache.mset(&entries, &huge).await,
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(!cache.exists("k", &opts()).await.unwrap());
        assert!(!cache.exists("m", &opts()).await.unwrap());

        cache.set("k", &1, &opts()).await.unwrap();
        assert!(matches!(
            cache.expire("k", MAX_TTL_SECS + 1, &opts()).await,
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(cache.expire("k", MAX_TTL_SECS, &opts()).await.unwrap());
        assert!(cache.get::<i32>("k", &opts()).await.is_some());
    }

    #[tokio::test]
    async fn test_write_errors_keep_caller_mistakes_distinct() {
        let cache = CacheService::new(Arc::new(FlakyStore::failing()), "test:");
        assert!(matches!(
            cache.set("k", &1, &opts()).await,
            Err(CacheError::StoreWrite(_))
        ));
        assert!(matches!(
            cache.set("k", &1, &opts().with_ttl(u64::MAX)).await,
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_raw_values_are_stored_verbatim() {
        let cache = service();
        cache.set("token", "abc123", &opts().raw()).await.unwrap();

        let stored = cache.store().get("test:token").await.unwrap();
        assert_eq!(stored.as_deref(), Some("abc123"));
        let read: Option<String> = cache.get("token", &opts().raw()).await;
        assert_eq!(read.as_deref(), Some("abc123"));

        cache.set("count", &5, &opts().raw()).await.unwrap();
        assert_eq!(cache.get::<i64>("count", &opts().raw()).await, Some(5));
    }

    #[tokio::test]
    async fn test_prefix_override() {
        let cache = service();
        let session = opts().with_prefix("sess:");
        cache.set("user:1", &"token", &session).await.unwrap();

        assert!(cache.store().exists("sess:user:1").await.unwrap());
        assert_eq!(cache.get::<String>("user:1", &opts()).await, None);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let cache = service();
        assert!(matches!(
            cache.set("", &1, &opts()).await,
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.incr("", 1, &opts()).await,
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let cache = service();
        cache.store().set("test:broken", "{not json").await.unwrap();

        assert_eq!(cache.get::<Workout>("broken", &opts()).await, None);
        let stats = cache.get_stats().await.unwrap();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_get_is_idempotent_and_counts_consistently() {
        let cache = service();
        assert_eq!(cache.get::<u32>("nope", &opts()).await, None);
        assert_eq!(cache.get::<u32>("nope", &opts()).await, None);

        cache.set("yes", &1u32, &opts()).await.unwrap();
        assert_eq!(cache.get::<u32>("yes", &opts()).await, Some(1));
        assert_eq!(cache.get::<u32>("yes", &opts()).await, Some(1));

        let stats = cache.get_stats().await.unwrap();
        assert_eq!((stats.hits, stats.misses), (2, 2));
        assert_eq!(stats.hit_ratio, 50.0);
    }

    #[tokio::test]
    async fn test_fallback_not_called_on_hit() {
        let cache = service();
        cache.set("w", &leg_day(), &opts()).await.unwrap();
        let calls = AtomicUsize::new(0);

        let result: std::result::Result<Workout, CacheError> = cache
            .get_with_fallback(
                "w",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Workout {
                        id: 0,
                        name: "other".into(),
                        exercises: vec![],
                    })
                },
                &opts(),
            )
            .await;

        assert_eq!(result.unwrap(), leg_day());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_populates_on_miss() {
        let cache = service();
        let calls = AtomicUsize::new(0);

        let fetched: std::result::Result<Workout, CacheError> = cache
            .get_with_fallback(
                "w",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(leg_day())
                },
                &opts().with_ttl(60),
            )
            .await;

        assert_eq!(fetched.unwrap(), leg_day());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get::<Workout>("w", &opts()).await, Some(leg_day()));
        assert!(cache.ttl("w", &opts()).await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_fallback_error_propagates_unchanged() {
        #[derive(Debug, PartialEq)]
        struct OriginDown;

        let cache = service();
        let result: std::result::Result<Workout, OriginDown> = cache
            .get_with_fallback("w", || async { Err(OriginDown) }, &opts())
            .await;

        assert_eq!(result, Err(OriginDown));
        assert!(!cache.exists("w", &opts()).await.unwrap());
    }

    #[tokio::test]
    async fn test_del_and_exists() {
        let cache = service();
        cache.set("k", &1, &opts()).await.unwrap();

        assert!(cache.exists("k", &opts()).await.unwrap());
        assert!(cache.del("k", &opts()).await.unwrap());
        assert!(!cache.del("k", &opts()).await.unwrap());
        assert!(!cache.exists("k", &opts()).await.unwrap());
    }

    #[tokio::test]
    async fn test_expire() {
        let cache = service();
        assert!(!cache.expire("ghost", 10, &opts()).await.unwrap());

        cache.set("k", &1, &opts()).await.unwrap();
        assert!(cache.expire("k", 10, &opts()).await.unwrap());
        assert!(cache.ttl("k", &opts()).await.unwrap() > 0);

        assert!(matches!(
            cache.expire("k", 0, &opts()).await,
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_invalidate_pattern_scope() {
        let cache = service();
        let mut entries = HashMap::new();
        entries.insert("a:1".to_string(), 1);
        entries.insert("a:2".to_string(), 2);
        entries.insert("b:1".to_string(), 3);
        cache.mset(&entries, &opts()).await.unwrap();

        let removed = cache.invalidate_pattern("a:*", &opts()).await.unwrap();
        assert_eq!(removed, 2);
        assert!(!cache.exists("a:1", &opts()).await.unwrap());
        assert!(!cache.exists("a:2", &opts()).await.unwrap());
        assert_eq!(cache.get::<i32>("b:1", &opts()).await, Some(3));

        assert_eq!(cache.invalidate_pattern("zzz:*", &opts()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_pattern_validation() {
        let cache = service();
        assert!(matches!(
            cache.invalidate_pattern("", &opts()).await,
            Err(CacheError::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.invalidate_pattern("user:[", &opts()).await,
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_pattern_rejected_before_store_is_used() {
        let cache = CacheService::new(Arc::new(FlakyStore::failing()), "test:");
        for pattern in ["user:[", "user:[z-a]"] {
            assert!(matches!(
                cache.invalidate_pattern(pattern, &opts()).await,
                Err(CacheError::InvalidArgument(_))
            ));
        }
        assert!(matches!(
            cache.invalidate_pattern("user:*", &opts()).await,
            Err(CacheError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_invalidate_everything_keeps_stats() {
        let cache = service();
        cache.set("x", &1, &opts()).await.unwrap();
        cache.get::<i32>("x", &opts()).await;

        assert_eq!(cache.invalidate_pattern("*", &opts()).await.unwrap(), 1);
        assert_eq!(cache.get_stats().await.unwrap().hits, 1);
    }

    #[tokio::test]
    async fn test_mget_preserves_order() {
        let cache = service();
        cache.set("one", &1, &opts()).await.unwrap();
        cache.set("three", &3, &opts()).await.unwrap();

        let values: Vec<Option<i32>> = cache.mget(&["one", "two", "three"], &opts()).await;
        assert_eq!(values, vec![Some(1), None, Some(3)]);
    }

    #[tokio::test]
    async fn test_mset_shared_ttl() {
        let cache = service();
        let mut entries = HashMap::new();
        entries.insert("x".to_string(), "1");
        entries.insert("y".to_string(), "2");
        cache.mset(&entries, &opts().with_ttl(30)).await.unwrap();

        for key in ["x", "y"] {
            let ttl = cache.ttl(key, &opts()).await.unwrap();
            assert!((29..=30).contains(&ttl));
        }
    }

    #[tokio::test]
    async fn test_incr() {
        let cache = service();
        assert_eq!(cache.incr("hits", 1, &opts()).await.unwrap(), 1);
        assert_eq!(cache.incr("hits", 4, &opts()).await.unwrap(), 5);
        assert_eq!(cache.incr("hits", -1, &opts()).await.unwrap(), 4);
        assert_eq!(cache.peek::<i64>("hits", &opts()).await.unwrap(), Some(4));
    }

    #[tokio::test]
    async fn test_incr_with_expiry() {
        let cache = service();
        assert_eq!(cache.incr_with_expiry("rl", 1, 60, &opts()).await.unwrap(), 1);
        assert_eq!(cache.incr_with_expiry("rl", 1, 60, &opts()).await.unwrap(), 2);
        let ttl = cache.ttl("rl", &opts()).await.unwrap();
        assert!((59..=60).contains(&ttl));

        assert!(matches!(
            cache.incr_with_expiry("rl", 1, 0, &opts()).await,
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_peek_does_not_touch_stats() {
        let cache = service();
        cache.set("k", &1, &opts()).await.unwrap();
        assert_eq!(cache.peek::<i32>("k", &opts()).await.unwrap(), Some(1));
        assert_eq!(cache.peek::<i32>("none", &opts()).await.unwrap(), None);

        let stats = cache.get_stats().await.unwrap();
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let cache = service();
        cache.set("k", &1, &opts()).await.unwrap();
        for _ in 0..3 {
            cache.get::<i32>("k", &opts()).await;
        }
        cache.get::<i32>("missing", &opts()).await;

        let stats = cache.get_stats().await.unwrap();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio, 75.0);
        assert!(stats.total_keys >= 1);

        cache.clear_stats().await.unwrap();
        let stats = cache.get_stats().await.unwrap();
        assert_eq!(stats.hit_ratio, 0.0);
        assert_eq!(cache.get::<i32>("k", &opts()).await, Some(1));
    }

    #[tokio::test]
    async fn test_flush_removes_everything() {
        let cache = service();
        cache.set("k1", &1, &opts()).await.unwrap();
        cache.set("k2", &2, &opts()).await.unwrap();

        cache.flush().await.unwrap();
        assert_eq!(cache.store().dbsize().await.unwrap(), 0);
    }
}
