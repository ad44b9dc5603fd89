//! API Handlers
//!
//! HTTP request handlers for each endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::cache::{CacheOptions, CacheService, CacheStats};
use crate::config::{Config, ConnectionKind};
use crate::connections::{Connections, HealthReport};
use crate::error::{CacheError, Result};
use crate::middleware::{RateLimitConfig, RateLimiter};
use crate::models::{
    ApiResponse, DeleteResponse, EntryResponse, HealthData, InvalidateRequest, InvalidateResponse,
    MessageResponse, SetRequest,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<Connections>,
    /// Cache engine over the cache connection
    pub cache: CacheService,
    /// Limiter guarding `/api`
    pub limiter: RateLimiter,
    /// TTL applied to entries written without one
    pub default_ttl: u64,
    pub health_timeout: Duration,
}

impl AppState {
    /// Wires the cache engine and the default rate limiter onto `connections`.
    pub fn new(connections: Arc<Connections>, config: &Config) -> Result<Self> {
        let cache = connections.service(ConnectionKind::Cache)?;
        let limiter = RateLimiter::new(
            connections.service(ConnectionKind::RateLimit)?,
            RateLimitConfig::new(config.rate_limit_window, config.rate_limit_max),
        )?;

        Ok(Self {
            connections,
            cache,
            limiter,
            default_ttl: config.default_ttl,
            health_timeout: config.health_timeout,
        })
    }

    /// Replaces the limiter guarding `/api`.
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }
}

fn health_failure(err: CacheError) -> CacheError {
    warn!("Health check failed: {}", err);
    CacheError::Internal(format!("Health check failed: {}", err))
}

/// Handler for GET /health
pub async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<HealthData>>> {
    let report: HealthReport = state
        .connections
        .health(state.health_timeout)
        .await
        .map_err(health_failure)?;
    Ok(Json(ApiResponse::ok(HealthData::new(report))))
}

/// Handler for GET /health/redis
pub async fn redis_health_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<HealthData>>> {
    let report = state
        .connections
        .detailed_health(state.health_timeout)
        .await
        .map_err(health_failure)?;
    Ok(Json(ApiResponse::ok(HealthData::new(report))))
}

/// Handler for GET /api/cache/stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<ApiResponse<CacheStats>>> {
    let stats = state.cache.get_stats().await?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// Handler for DELETE /api/cache/stats
pub async fn clear_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MessageResponse>>> {
    state.cache.clear_stats().await?;
    Ok(Json(ApiResponse::ok(MessageResponse::new(
        "Cache statistics cleared",
    ))))
}

/// Handler for POST /api/cache/invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<ApiResponse<InvalidateResponse>>> {
    let deleted = state
        .cache
        .invalidate_pattern(&req.pattern, &CacheOptions::default())
        .await?;
    info!("Invalidated {} keys matching {}", deleted, req.pattern);

    Ok(Json(ApiResponse::ok(InvalidateResponse {
        pattern: req.pattern,
        deleted,
    })))
}

/// Handler for DELETE /api/cache
pub async fn flush_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<MessageResponse>>> {
    state.cache.flush().await?;
    Ok(Json(ApiResponse::ok(MessageResponse::new("Cache flushed"))))
}

/// Handler for PUT /api/cache/entries
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<ApiResponse<EntryResponse>>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidArgument(error_msg));
    }

    let options = CacheOptions::new().with_ttl(req.ttl.unwrap_or(state.default_ttl));
    state.cache.set(&req.key, &req.value, &options).await?;
    let ttl = state.cache.ttl(&req.key, &options).await?;

    Ok(Json(ApiResponse::ok(EntryResponse {
        key: req.key,
        value: req.value,
        ttl,
    })))
}

/// Handler for GET /api/cache/entries/:key
///
/// Counts toward hit/miss statistics like any other cache read.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<EntryResponse>>> {
    let options = CacheOptions::default();
    let value = state
        .cache
        .get::<Value>(&key, &options)
        .await
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;
    let ttl = state.cache.ttl(&key, &options).await?;

    Ok(Json(ApiResponse::ok(EntryResponse { key, value, ttl })))
}

/// Handler for DELETE /api/cache/entries/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<DeleteResponse>>> {
    let deleted = state.cache.del(&key, &CacheOptions::default()).await?;
    Ok(Json(ApiResponse::ok(DeleteResponse { key, deleted })))
}
