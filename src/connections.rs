//! Connections Module
//!
//! Named, separately namespaced store connections (cache, session, rate
//! limit, pub/sub, queue), the health probe and shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::CacheService;
use crate::config::{Backend, ConnectionKind, RedisSettings};
use crate::error::{CacheError, Result};
use crate::store::{info_field, KeyValueStore, MemoryStore, RedisStore};

/// Health of the store as seen by one probe.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// `healthy` or `unhealthy`
    pub status: String,
    /// Round-trip time of the ping in milliseconds
    pub latency: u64,
    pub memory_usage: String,
    /// Keys per named connection; filled by `detailed_health`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<HashMap<String, u64>>,
}

/// Registry of named connections.
#[derive(Clone)]
pub struct Connections {
    stores: HashMap<ConnectionKind, Arc<dyn KeyValueStore>>,
    prefixes: HashMap<ConnectionKind, String>,
    /// Concrete handles of in-memory stores, for the expiry sweeper
    memory: Vec<Arc<MemoryStore>>,
}

impl Connections {
    /// Opens every named connection against the configured backend.
    pub async fn connect(backend: Backend, settings: &RedisSettings) -> Result<Self> {
        match backend {
            Backend::Memory => Ok(Self::in_memory(settings)),
            Backend::Redis => {
                let mut stores: HashMap<ConnectionKind, Arc<dyn KeyValueStore>> = HashMap::new();
                for kind in ConnectionKind::ALL {
                    info!(
                        "Connecting '{}' to redis at {}",
                        kind.name(),
                        settings.address(kind)
                    );
                    let store = RedisStore::connect(
                        kind.name(),
                        settings.connection_info(kind),
                        settings.connect_timeout,
                        settings.command_timeout,
                    )
                    .await?;
                    stores.insert(kind, Arc::new(store));
                }
                Ok(Self::from_parts(stores, settings))
            }
        }
    }

    /// One independent in-memory store per named connection.
    pub fn in_memory(settings: &RedisSettings) -> Self {
        let memory: Vec<Arc<MemoryStore>> = ConnectionKind::ALL
            .iter()
            .map(|_| Arc::new(MemoryStore::new()))
            .collect();
        let stores = ConnectionKind::ALL
            .into_iter()
            .zip(memory.iter())
            .map(|(kind, store)| (kind, store.clone() as Arc<dyn KeyValueStore>))
            .collect();
        let mut connections = Self::from_parts(stores, settings);
        connections.memory = memory;
        connections
    }

    fn from_parts(
        stores: HashMap<ConnectionKind, Arc<dyn KeyValueStore>>,
        settings: &RedisSettings,
    ) -> Self {
        let prefixes = ConnectionKind::ALL
            .into_iter()
            .map(|kind| (kind, settings.prefix(kind)))
            .collect();
        Self {
            stores,
            prefixes,
            memory: Vec::new(),
        }
    }

    /// Builds a registry from explicit stores, for tests and custom wiring.
    /// Connections not supplied share the cache store.
    pub fn with_stores(
        cache: Arc<dyn KeyValueStore>,
        overrides: HashMap<ConnectionKind, Arc<dyn KeyValueStore>>,
        settings: &RedisSettings,
    ) -> Self {
        let stores = ConnectionKind::ALL
            .into_iter()
            .map(|kind| {
                let store = overrides.get(&kind).cloned().unwrap_or_else(|| cache.clone());
                (kind, store)
            })
            .collect();
        Self::from_parts(stores, settings)
    }

    /// In-memory stores backing this registry; empty for Redis.
    pub fn memory_stores(&self) -> &[Arc<MemoryStore>] {
        &self.memory
    }

    pub fn store(&self, kind: ConnectionKind) -> Result<Arc<dyn KeyValueStore>> {
        self.stores
            .get(&kind)
            .cloned()
            .ok_or_else(|| CacheError::Internal(format!("no '{}' connection", kind.name())))
    }

    /// Cache engine bound to one named connection and its namespace.
    pub fn service(&self, kind: ConnectionKind) -> Result<CacheService> {
        let prefix = self.prefixes.get(&kind).cloned().unwrap_or_default();
        Ok(CacheService::new(self.store(kind)?, prefix))
    }

    // == Health ==
    /// Pings the cache connection under `deadline` and reports latency and
    /// memory usage.
    pub async fn health(&self, deadline: Duration) -> Result<HealthReport> {
        let store = self.store(ConnectionKind::Cache)?;
        let started = Instant::now();
        tokio::time::timeout(deadline, store.ping())
            .await
            .map_err(|_| CacheError::Timeout(deadline))??;
        let latency = started.elapsed().as_millis() as u64;

        let memory_usage = match tokio::time::timeout(deadline, store.info("memory")).await {
            Ok(Ok(info)) => {
                info_field(&info, "used_memory_human").unwrap_or_else(|| "unknown".into())
            }
            _ => "unknown".to_string(),
        };

        Ok(HealthReport {
            status: "healthy".to_string(),
            latency,
            memory_usage,
            namespaces: None,
        })
    }

    /// `health` plus the key count of every named connection.
    pub async fn detailed_health(&self, deadline: Duration) -> Result<HealthReport> {
        let mut report = self.health(deadline).await?;
        let mut namespaces = HashMap::new();
        for kind in ConnectionKind::ALL {
            let store = self.store(kind)?;
            let keys = tokio::time::timeout(deadline, store.dbsize())
                .await
                .map_err(|_| CacheError::Timeout(deadline))??;
            namespaces.insert(kind.name().to_string(), keys);
        }
        report.namespaces = Some(namespaces);
        Ok(report)
    }

    // == Shutdown ==
    /// Closes every named connection. Called by the host on termination.
    pub async fn shutdown(&self) {
        for kind in ConnectionKind::ALL {
            if let Some(store) = self.stores.get(&kind) {
                if let Err(e) = store.close().await {
                    warn!("Error closing '{}' connection: {}", kind.name(), e);
                }
            }
        }
        info!("All store connections closed");
    }
}
