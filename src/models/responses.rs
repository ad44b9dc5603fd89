//! Response DTOs for the cache API
//!
//! Successful responses share the `{ "success": true, "data": ... }`
//! envelope; failures are rendered by `CacheError`.

use serde::Serialize;
use serde_json::Value;

use crate::connections::HealthReport;

/// Success envelope wrapping every response body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Body of the health endpoints
#[derive(Debug, Clone, Serialize)]
pub struct HealthData {
    pub redis: HealthReport,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthData {
    pub fn new(redis: HealthReport) -> Self {
        Self {
            redis,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A cached entry and its remaining lifetime
#[derive(Debug, Clone, Serialize)]
pub struct EntryResponse {
    pub key: String,
    pub value: Value,
    /// Seconds left, `-1` when the entry never expires
    pub ttl: i64,
}

/// Response body for entry deletion
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub key: String,
    /// False when the key did not exist
    pub deleted: bool,
}

/// Response body for pattern invalidation
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub pattern: String,
    pub deleted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
