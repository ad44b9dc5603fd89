//! # Redis Store
//!
//! Store protocol over a Redis `ConnectionManager`. Every command is bounded
//! by the command timeout so a stalled server cannot hang a request.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, ConnectionInfo, RedisResult};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{check_ttl, KeyValueStore};
use crate::error::{CacheError, Result};

const SCAN_BATCH: usize = 500;

/// Redis-backed store for one logical database.
pub struct RedisStore {
    /// Connection name, for logs
    name: String,
    /// None once closed
    connection: RwLock<Option<ConnectionManager>>,
    command_timeout: Duration,
}

impl RedisStore {
    /// Opens a managed connection, failing if it cannot be established within
    /// `connect_timeout`.
    pub async fn connect(
        name: impl Into<String>,
        info: ConnectionInfo,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let client = Client::open(info)?;
        let manager = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout(connect_timeout))??;

        info!("Redis connection '{}' established", name);

        Ok(Self {
            name,
            connection: RwLock::new(Some(manager)),
            command_timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        self.connection.read().await.clone().ok_or_else(|| {
            CacheError::StoreUnavailable(format!("connection '{}' is closed", self.name))
        })
    }

    /// Runs one command against a clone of the managed connection under the
    /// command timeout.
    async fn run<T, F, Fut>(&self, command: F) -> Result<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await?;
        match tokio::time::timeout(self.command_timeout, command(conn)).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout(self.command_timeout)),
        }
    }
}

/// `EXPIRE` takes a signed count; anything past the cap is refused locally.
fn expiry_secs(ttl_secs: u64) -> Result<i64> {
    check_ttl(ttl_secs)?;
    i64::try_from(ttl_secs)
        .map_err(|_| CacheError::InvalidArgument(format!("ttl {} is out of range", ttl_secs)))
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.run(move |mut conn| async move { conn.get(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.run(move |mut conn| async move { conn.set(key, value).await })
            .await
            .map_err(|e| CacheError::StoreWrite(e.to_string()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        check_ttl(ttl_secs)?;
        let (key, value) = (key.to_string(), value.to_string());
        self.run(move |mut conn| async move { conn.set_ex(key, value, ttl_secs).await })
            .await
            .map_err(|e| CacheError::StoreWrite(e.to_string()))
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let keys = keys.to_vec();
        self.run(move |mut conn| async move { conn.del(keys).await })
            .await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.run(move |mut conn| async move { conn.exists(key).await })
            .await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        let key = key.to_string();
        let seconds = expiry_secs(ttl_secs)?;
        self.run(move |mut conn| async move { conn.expire(key, seconds).await })
            .await
    }

    async fn ttl(&self, key: &str) -> Result<i64> {
        let key = key.to_string();
        self.run(move |mut conn| async move { conn.ttl(key).await })
            .await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        // SCAN instead of KEYS so large keyspaces do not block the server
        let pattern = pattern.to_string();
        self.run(move |mut conn| async move {
            let mut cursor = 0u64;
            let mut all_keys = Vec::new();
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn)
                    .await?;
                all_keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            all_keys.sort();
            all_keys.dedup();
            Ok::<_, redis::RedisError>(all_keys)
        })
        .await
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let keys = keys.to_vec();
        self.run(move |mut conn| async move {
            redis::cmd("MGET").arg(keys).query_async(&mut conn).await
        })
        .await
    }

    async fn mset(&self, entries: &[(String, String)], ttl_secs: Option<u64>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if let Some(ttl) = ttl_secs {
            check_ttl(ttl)?;
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            match ttl_secs.filter(|ttl| *ttl > 0) {
                Some(ttl) => pipe.set_ex(key, value, ttl).ignore(),
                None => pipe.set(key, value).ignore(),
            };
        }
        debug!("Pipelining {} writes on '{}'", entries.len(), self.name);
        self.run(move |mut conn| async move { pipe.query_async(&mut conn).await })
            .await
            .map_err(|e| CacheError::StoreWrite(e.to_string()))
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        let key = key.to_string();
        self.run(move |mut conn| async move { conn.incr(key, amount).await })
            .await
    }

    async fn incr_with_expiry(&self, key: &str, amount: i64, ttl_secs: u64) -> Result<i64> {
        let seconds = expiry_secs(ttl_secs)?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .incr(key, amount)
            .expire(key, seconds)
            .ignore();
        let (count,): (i64,) = self
            .run(move |mut conn| async move { pipe.query_async(&mut conn).await })
            .await?;
        Ok(count)
    }

    async fn hincr_by(&self, key: &str, field: &str, amount: i64) -> Result<i64> {
        let (key, field) = (key.to_string(), field.to_string());
        self.run(move |mut conn| async move { conn.hincr(key, field, amount).await })
            .await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let key = key.to_string();
        self.run(move |mut conn| async move { conn.hgetall(key).await })
            .await
    }

    async fn info(&self, section: &str) -> Result<String> {
        let section = section.to_string();
        self.run(move |mut conn| async move {
            redis::cmd("INFO").arg(section).query_async(&mut conn).await
        })
        .await
    }

    async fn dbsize(&self) -> Result<u64> {
        self.run(|mut conn| async move { redis::cmd("DBSIZE").query_async(&mut conn).await })
            .await
    }

    async fn flushdb(&self) -> Result<()> {
        self.run(|mut conn| async move { redis::cmd("FLUSHDB").query_async(&mut conn).await })
            .await
    }

    async fn ping(&self) -> Result<()> {
        let reply: String = self
            .run(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(CacheError::StoreUnavailable(format!(
                "unexpected PING reply '{}'",
                reply
            )))
        }
    }

    async fn close(&self) -> Result<()> {
        if self.connection.write().await.take().is_some() {
            info!("Redis connection '{}' closed", self.name);
        }
        Ok(())
    }
}
