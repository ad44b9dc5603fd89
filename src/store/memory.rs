//! In-Memory Store Module
//!
//! HashMap-backed implementation of the store protocol with lazy TTL
//! expiration and a sweep hook for the background task.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    check_ttl, GlobPattern, KeyValueStore, StoreEntry, StoredValue, TTL_MISSING, TTL_PERSISTENT,
};
use crate::error::{CacheError, Result};

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

// == Memory Store ==
/// In-process key-value store. Every command holds the map lock for its whole
/// duration, so counters and batch writes are atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoreEntry>>,
}

impl MemoryStore {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    // == Length ==
    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn live<'a>(entries: &'a HashMap<String, StoreEntry>, key: &str) -> Option<&'a StoreEntry> {
        entries.get(key).filter(|entry| !entry.is_expired())
    }

    fn live_mut<'a>(
        entries: &'a mut HashMap<String, StoreEntry>,
        key: &str,
    ) -> Option<&'a mut StoreEntry> {
        if entries.get(key).is_some_and(|entry| entry.is_expired()) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    /// INCRBY on a locked map. An existing TTL survives the increment, as in
    /// Redis; a new key has none.
    fn increment(entries: &mut HashMap<String, StoreEntry>, key: &str, amount: i64) -> Result<i64> {
        match Self::live_mut(entries, key) {
            Some(entry) => {
                let current = match &entry.value {
                    StoredValue::Str(s) => s.parse::<i64>().map_err(|_| {
                        CacheError::InvalidArgument(
                            "value is not an integer or out of range".into(),
                        )
                    })?,
                    StoredValue::Hash(_) => {
                        return Err(CacheError::InvalidArgument(WRONG_TYPE.into()))
                    }
                };
                let next = current.checked_add(amount).ok_or_else(|| {
                    CacheError::InvalidArgument("increment or decrement would overflow".into())
                })?;
                entry.value = StoredValue::Str(next.to_string());
                Ok(next)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    StoreEntry::new(StoredValue::Str(amount.to_string()), None),
                );
                Ok(amount)
            }
        }
    }

    fn human_bytes(bytes: usize) -> String {
        let b = bytes as f64;
        if b >= 1024.0 * 1024.0 * 1024.0 {
            format!("{:.2}G", b / (1024.0 * 1024.0 * 1024.0))
        } else if b >= 1024.0 * 1024.0 {
            format!("{:.2}M", b / (1024.0 * 1024.0))
        } else if b >= 1024.0 {
            format!("{:.2}K", b / 1024.0)
        } else {
            format!("{}B", bytes)
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        match Self::live(&entries, key).map(|e| &e.value) {
            Some(StoredValue::Str(value)) => Ok(Some(value.clone())),
            Some(StoredValue::Hash(_)) => Err(CacheError::InvalidArgument(WRONG_TYPE.into())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            StoreEntry::new(StoredValue::Str(value.to_string()), None),
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        if ttl_secs == 0 {
            return Err(CacheError::InvalidArgument(
                "invalid expire time in 'setex' command".into(),
            ));
        }
        check_ttl(ttl_secs)?;
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            StoreEntry::new(StoredValue::Str(value.to_string()), Some(ttl_secs)),
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| !entry.is_expired())
            .count();
        Ok(removed as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(Self::live(&entries, key).is_some())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        check_ttl(ttl_secs)?;
        let mut entries = self.entries.write().await;
        match Self::live_mut(&mut entries, key) {
            Some(entry) => {
                entry.expire_in(ttl_secs);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let entries = self.entries.read().await;
        Ok(match Self::live(&entries, key) {
            Some(entry) => entry
                .ttl_remaining()
                .map(|secs| secs as i64)
                .unwrap_or(TTL_PERSISTENT),
            None => TTL_MISSING,
        })
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let glob = GlobPattern::new(pattern)?;
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && glob.matches(key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .map(|key| match Self::live(&entries, key).map(|e| &e.value) {
                Some(StoredValue::Str(value)) => Some(value.clone()),
                _ => None,
            })
            .collect())
    }

    async fn mset(&self, batch: &[(String, String)], ttl_secs: Option<u64>) -> Result<()> {
        if let Some(ttl) = ttl_secs {
            check_ttl(ttl)?;
        }
        let ttl = ttl_secs.filter(|ttl| *ttl > 0);
        let mut entries = self.entries.write().await;
        for (key, value) in batch {
            entries.insert(
                key.clone(),
                StoreEntry::new(StoredValue::Str(value.clone()), ttl),
            );
        }
        Ok(())
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        let mut entries = self.entries.write().await;
        Self::increment(&mut entries, key, amount)
    }

    async fn incr_with_expiry(&self, key: &str, amount: i64, ttl_secs: u64) -> Result<i64> {
        check_ttl(ttl_secs)?;
        let mut entries = self.entries.write().await;
        let next = Self::increment(&mut entries, key, amount)?;
        if let Some(entry) = entries.get_mut(key) {
            entry.expire_in(ttl_secs);
        }
        Ok(next)
    }

    async fn hincr_by(&self, key: &str, field: &str, amount: i64) -> Result<i64> {
        let mut entries = self.entries.write().await;
        if Self::live_mut(&mut entries, key).is_none() {
            entries.insert(
                key.to_string(),
                StoreEntry::new(StoredValue::Hash(HashMap::new()), None),
            );
        }
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| CacheError::Internal("hash vanished under lock".into()))?;
        let hash = match &mut entry.value {
            StoredValue::Hash(h) => h,
            StoredValue::Str(_) => return Err(CacheError::InvalidArgument(WRONG_TYPE.into())),
        };
        let current = match hash.get(field) {
            Some(v) => v.parse::<i64>().map_err(|_| {
                CacheError::InvalidArgument("hash value is not an integer".into())
            })?,
            None => 0,
        };
        let next = current.checked_add(amount).ok_or_else(|| {
            CacheError::InvalidArgument("increment or decrement would overflow".into())
        })?;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let entries = self.entries.read().await;
        match Self::live(&entries, key).map(|e| &e.value) {
            Some(StoredValue::Hash(h)) => Ok(h.clone()),
            Some(StoredValue::Str(_)) => Err(CacheError::InvalidArgument(WRONG_TYPE.into())),
            None => Ok(HashMap::new()),
        }
    }

    async fn info(&self, section: &str) -> Result<String> {
        let entries = self.entries.read().await;
        let live: Vec<(&String, &StoreEntry)> =
            entries.iter().filter(|(_, e)| !e.is_expired()).collect();
        let used: usize = live.iter().map(|(k, e)| k.len() + e.value.size()).sum();
        let expiring = live.iter().filter(|(_, e)| e.expires_at.is_some()).count();

        let memory = format!(
            "# Memory\r\nused_memory:{}\r\nused_memory_human:{}\r\n",
            used,
            Self::human_bytes(used)
        );
        let keyspace = format!(
            "# Keyspace\r\ndb0:keys={},expires={}\r\n",
            live.len(),
            expiring
        );

        Ok(match section.to_ascii_lowercase().as_str() {
            "memory" => memory,
            "keyspace" => keyspace,
            _ => format!("# Server\r\nredis_mode:memory\r\n{}{}", memory, keyspace),
        })
    }

    async fn dbsize(&self) -> Result<u64> {
        Ok(self.len().await as u64)
    }

    async fn flushdb(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
