//! Configuration Module
//!
//! Handles loading and managing server, store and rate limiter configuration
//! from environment variables.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

// == Connection Kind ==
/// Named store connections. Each one lives in its own logical database and
/// key namespace so that flushing one partition cannot touch another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    Cache,
    Session,
    RateLimit,
    PubSub,
    Queue,
}

impl ConnectionKind {
    pub const ALL: [ConnectionKind; 5] = [
        ConnectionKind::Cache,
        ConnectionKind::Session,
        ConnectionKind::RateLimit,
        ConnectionKind::PubSub,
        ConnectionKind::Queue,
    ];

    /// Short name used in logs and health reports.
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionKind::Cache => "cache",
            ConnectionKind::Session => "session",
            ConnectionKind::RateLimit => "rate_limit",
            ConnectionKind::PubSub => "pubsub",
            ConnectionKind::Queue => "queue",
        }
    }

    fn namespace(&self) -> &'static str {
        match self {
            ConnectionKind::Cache => "cache:",
            ConnectionKind::Session => "sess:",
            ConnectionKind::RateLimit => "rl:",
            ConnectionKind::PubSub => "pubsub:",
            ConnectionKind::Queue => "queue:",
        }
    }

    /// Prefix of the per-connection environment variables.
    fn env_prefix(&self) -> &'static str {
        match self {
            ConnectionKind::Cache => "REDIS_CACHE",
            ConnectionKind::Session => "REDIS_SESSION",
            ConnectionKind::RateLimit => "REDIS_RATE_LIMIT",
            ConnectionKind::PubSub => "REDIS_PUBSUB",
            ConnectionKind::Queue => "REDIS_QUEUE",
        }
    }

    fn default_db(&self) -> i64 {
        match self {
            ConnectionKind::Cache => 0,
            ConnectionKind::Session => 1,
            ConnectionKind::RateLimit => 2,
            ConnectionKind::PubSub => 3,
            ConnectionKind::Queue => 4,
        }
    }
}

// == Backend ==
/// Which store implementation backs the named connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Redis,
    Memory,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Backend::Redis),
            "memory" | "in-memory" => Ok(Backend::Memory),
            other => Err(format!("unknown cache backend '{}'", other)),
        }
    }
}

// == Redis Settings ==
/// Per-connection replacements for the shared connection parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionOverride {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    /// Full key prefix, used instead of `{key_prefix}{namespace}`
    pub prefix: Option<String>,
}

impl ConnectionOverride {
    /// Reads `REDIS_{KIND}_{HOST,PORT,PASSWORD,PREFIX}`.
    pub fn from_env(kind: ConnectionKind) -> Self {
        let var = |suffix: &str| {
            env::var(format!("{}_{}", kind.env_prefix(), suffix))
                .ok()
                .filter(|v| !v.is_empty())
        };
        Self {
            host: var("HOST"),
            port: var("PORT").and_then(|p| p.parse().ok()),
            password: var("PASSWORD"),
            prefix: var("PREFIX"),
        }
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Connection parameters of the named connections. Shared values apply to
/// every connection unless overridden for that connection.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Global prefix, namespaced further per connection kind
    pub key_prefix: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    /// Logical database index per connection kind, in `ConnectionKind::ALL` order
    pub databases: [i64; 5],
    pub overrides: HashMap<ConnectionKind, ConnectionOverride>,
}

impl RedisSettings {
    fn index(kind: ConnectionKind) -> usize {
        ConnectionKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default()
    }

    /// Logical database index used by the given connection.
    pub fn database(&self, kind: ConnectionKind) -> i64 {
        self.databases[Self::index(kind)]
    }

    pub fn host(&self, kind: ConnectionKind) -> &str {
        self.overrides
            .get(&kind)
            .and_then(|o| o.host.as_deref())
            .unwrap_or(&self.host)
    }

    pub fn port(&self, kind: ConnectionKind) -> u16 {
        self.overrides
            .get(&kind)
            .and_then(|o| o.port)
            .unwrap_or(self.port)
    }

    pub fn password(&self, kind: ConnectionKind) -> Option<&str> {
        self.overrides
            .get(&kind)
            .and_then(|o| o.password.as_deref())
            .or(self.password.as_deref())
            .filter(|p| !p.is_empty())
    }

    /// Key prefix used by the given connection.
    pub fn prefix(&self, kind: ConnectionKind) -> String {
        match self.overrides.get(&kind).and_then(|o| o.prefix.as_ref()) {
            Some(prefix) => prefix.clone(),
            None => format!("{}{}", self.key_prefix, kind.namespace()),
        }
    }

    /// Client connection parameters. The password is passed as a field, so
    /// it needs no URL escaping.
    pub fn connection_info(&self, kind: ConnectionKind) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host(kind).to_string(), self.port(kind)),
            redis: RedisConnectionInfo {
                db: self.database(kind),
                password: self.password(kind).map(str::to_string),
                ..Default::default()
            },
        }
    }

    /// `host:port/db`, for logs.
    pub fn address(&self, kind: ConnectionKind) -> String {
        format!(
            "{}:{}/{}",
            self.host(kind),
            self.port(kind),
            self.database(kind)
        )
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            key_prefix: "fitness:".to_string(),
            connect_timeout: Duration::from_millis(5000),
            command_timeout: Duration::from_millis(1000),
            databases: [0, 1, 2, 3, 4],
            overrides: HashMap::new(),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Store implementation
    pub backend: Backend,
    /// Default TTL in seconds applied by the entry endpoints
    pub default_ttl: u64,
    /// Expiry sweep interval of the in-memory backend, in seconds
    pub sweep_interval: u64,
    /// Deadline for the health probe round-trip
    pub health_timeout: Duration,
    /// Default rate limiting window
    pub rate_limit_window: Duration,
    /// Default requests allowed per window
    pub rate_limit_max: u64,
    pub redis: RedisSettings,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_BACKEND` - `redis` or `memory` (default: redis)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `SWEEP_INTERVAL` - Memory backend sweep frequency in seconds (default: 1)
    /// - `HEALTH_TIMEOUT_MS` - Health probe deadline (default: 2000)
    /// - `RATE_LIMIT_WINDOW_MS` / `RATE_LIMIT_MAX` - Limiter defaults (900000 / 100)
    /// - `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`, `REDIS_KEY_PREFIX`
    /// - `REDIS_CONNECT_TIMEOUT_MS`, `REDIS_COMMAND_TIMEOUT_MS`
    /// - `REDIS_{CACHE,SESSION,RATE_LIMIT,PUBSUB,QUEUE}_DB` - Logical databases (0..4)
    /// - `REDIS_{CACHE,...}_{HOST,PORT,PASSWORD,PREFIX}` - Per-connection overrides
    pub fn from_env() -> Self {
        let defaults = Config::default();
        let redis_defaults = defaults.redis.clone();

        let mut databases = redis_defaults.databases;
        let mut overrides = HashMap::new();
        for (slot, kind) in databases.iter_mut().zip(ConnectionKind::ALL) {
            *slot = env_or(&format!("{}_DB", kind.env_prefix()), kind.default_db());
            let endpoint = ConnectionOverride::from_env(kind);
            if !endpoint.is_empty() {
                overrides.insert(kind, endpoint);
            }
        }

        let redis = RedisSettings {
            host: env::var("REDIS_HOST").unwrap_or(redis_defaults.host),
            port: env_or("REDIS_PORT", redis_defaults.port),
            password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
            key_prefix: env::var("REDIS_KEY_PREFIX").unwrap_or(redis_defaults.key_prefix),
            connect_timeout: Duration::from_millis(env_or("REDIS_CONNECT_TIMEOUT_MS", 5000)),
            command_timeout: Duration::from_millis(env_or("REDIS_COMMAND_TIMEOUT_MS", 1000)),
            databases,
            overrides,
        };

        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            backend: env_or("CACHE_BACKEND", defaults.backend),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            sweep_interval: env_or("SWEEP_INTERVAL", defaults.sweep_interval),
            health_timeout: Duration::from_millis(env_or("HEALTH_TIMEOUT_MS", 2000)),
            rate_limit_window: Duration::from_millis(env_or("RATE_LIMIT_WINDOW_MS", 900_000)),
            rate_limit_max: env_or("RATE_LIMIT_MAX", defaults.rate_limit_max),
            redis,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            backend: Backend::Redis,
            default_ttl: 300,
            sweep_interval: 1,
            health_timeout: Duration::from_millis(2000),
            rate_limit_window: Duration::from_millis(900_000),
            rate_limit_max: 100,
            redis: RedisSettings::default(),
        }
    }
}
