//! Shared helpers for the integration tests.

use std::collections::HashMap;

use async_trait::async_trait;
use fitness_cache::{CacheError, KeyValueStore, Result};

/// A store whose every command fails, as when Redis is down.
pub struct UnreachableStore;

fn down<T>() -> Result<T> {
    Err(CacheError::StoreUnavailable("connection refused".into()))
}

#[async_trait]
impl KeyValueStore for UnreachableStore {
    fn backend(&self) -> &'static str {
        "unreachable"
    }
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        down()
    }
    async fn set(&self, _key: &str, _value: &str) -> Result<()> {
        down()
    }
    async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<()> {
        down()
    }
    async fn del(&self, _keys: &[String]) -> Result<u64> {
        down()
    }
    async fn exists(&self, _key: &str) -> Result<bool> {
        down()
    }
    async fn expire(&self, _key: &str, _ttl_secs: u64) -> Result<bool> {
        down()
    }
    async fn ttl(&self, _key: &str) -> Result<i64> {
        down()
    }
    async fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
        down()
    }
    async fn mget(&self, _keys: &[String]) -> Result<Vec<Option<String>>> {
        down()
    }
    async fn mset(&self, _entries: &[(String, String)], _ttl_secs: Option<u64>) -> Result<()> {
        down()
    }
    async fn incr_by(&self, _key: &str, _amount: i64) -> Result<i64> {
        down()
    }
    async fn incr_with_expiry(&self, _key: &str, _amount: i64, _ttl_secs: u64) -> Result<i64> {
        down()
    }
    async fn hincr_by(&self, _key: &str, _field: &str, _amount: i64) -> Result<i64> {
        down()
    }
    async fn hgetall(&self, _key: &str) -> Result<HashMap<String, String>> {
        down()
    }
    async fn info(&self, _section: &str) -> Result<String> {
        down()
    }
    async fn dbsize(&self) -> Result<u64> {
        down()
    }
    async fn flushdb(&self) -> Result<()> {
        down()
    }
    async fn ping(&self) -> Result<()> {
        down()
    }
}
