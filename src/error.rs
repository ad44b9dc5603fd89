//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache and rate limiting layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing store refused or failed a command
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store command exceeded the configured command timeout
    #[error("Store command timed out after {0:?}")]
    Timeout(Duration),

    /// A value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A write to the store failed
    #[error("Store write failed: {0}")]
    StoreWrite(String),

    /// Caller supplied an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Key not found (HTTP entry endpoints only)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// True for failures of the store itself, as opposed to caller mistakes.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            CacheError::StoreUnavailable(_) | CacheError::Timeout(_) | CacheError::StoreWrite(_)
        )
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidArgument(_) | CacheError::Serialization(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::StoreUnavailable(_) | CacheError::StoreWrite(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "success": false,
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type Result<T> = std::result::Result<T, CacheError>;
