//! Request DTOs for the cache API

use serde::Deserialize;
use serde_json::Value;

/// Longest key accepted by the entry endpoints.
pub const MAX_KEY_LENGTH: usize = 256;

/// Request body for `PUT /api/cache/entries`
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    /// Any JSON value; stored serialized
    pub value: Value,
    /// Optional TTL in seconds (server default when absent, `0` never expires)
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl SetRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} characters",
                MAX_KEY_LENGTH
            ));
        }
        None
    }
}

/// Request body for `POST /api/cache/invalidate`
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    /// Glob pattern relative to the cache namespace
    pub pattern: String,
}
