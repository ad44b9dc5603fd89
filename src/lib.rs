//! Fitness Cache - caching and rate limiting for the fitness API
//!
//! A cache-aside engine over Redis (or an in-memory stand-in), HTTP
//! middleware for response caching, invalidation and rate limiting, and a
//! small admin/health API.

pub mod api;
pub mod cache;
pub mod config;
pub mod connections;
pub mod error;
pub mod middleware;
pub mod models;
pub mod store;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{CacheOptions, CacheService, CacheStats};
pub use config::{Backend, Config, ConnectionKind, RedisSettings};
pub use connections::{Connections, HealthReport};
pub use error::{CacheError, Result};
pub use store::{KeyValueStore, MemoryStore, RedisStore};
pub use tasks::spawn_expiry_sweeper;
