//! Test store that wraps `MemoryStore` and fails selected commands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{KeyValueStore, MemoryStore};
use crate::error::{CacheError, Result};

#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    /// Plain `expire` calls fail
    pub fail_expire: AtomicBool,
    /// Every command fails
    pub fail_all: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.fail_all.store(true, Ordering::SeqCst);
        store
    }

    fn check(&self) -> Result<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(CacheError::StoreUnavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.check()?;
        self.inner.set_ex(key, value, ttl_secs).await
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        self.check()?;
        self.inner.del(keys).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        self.check()?;
        if self.fail_expire.load(Ordering::SeqCst) {
            return Err(CacheError::StoreUnavailable("connection reset".into()));
        }
        self.inner.expire(key, ttl_secs).await
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        self.check()?;
        self.inner.ttl(key).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check()?;
        self.inner.keys(pattern).await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.check()?;
        self.inner.mget(keys).await
    }

    async fn mset(&self, entries: &[(String, String)], ttl_secs: Option<u64>) -> Result<()> {
        self.check()?;
        self.inner.mset(entries, ttl_secs).await
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        self.check()?;
        self.inner.incr_by(key, amount).await
    }

    async fn incr_with_expiry(&self, key: &str, amount: i64, ttl_secs: u64) -> Result<i64> {
        self.check()?;
        self.inner.incr_with_expiry(key, amount, ttl_secs).await
    }

    async fn hincr_by(&self, key: &str, field: &str, amount: i64) -> Result<i64> {
        self.check()?;
        self.inner.hincr_by(key, field, amount).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.check()?;
        self.inner.hgetall(key).await
    }

    async fn info(&self, section: &str) -> Result<String> {
        self.check()?;
        self.inner.info(section).await
    }

    async fn dbsize(&self) -> Result<u64> {
        self.check()?;
        self.inner.dbsize().await
    }

    async fn flushdb(&self) -> Result<()> {
        self.check()?;
        self.inner.flushdb().await
    }

    async fn ping(&self) -> Result<()> {
        self.check()?;
        self.inner.ping().await
    }
}
