//! Store Entry Module
//!
//! Defines the structure for individual entries of the in-memory backend.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

// == Stored Value ==
/// Value types the in-memory backend understands.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Str(String),
    Hash(HashMap<String, String>),
}

impl StoredValue {
    /// Approximate payload size in bytes.
    pub fn size(&self) -> usize {
        match self {
            StoredValue::Str(s) => s.len(),
            StoredValue::Hash(h) => h.iter().map(|(k, v)| k.len() + v.len()).sum(),
        }
    }
}

// == Store Entry ==
/// Represents a single entry with value and expiry metadata.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The stored value
    pub value: StoredValue,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl StoreEntry {
    // == Constructor ==
    /// Creates a new entry with optional TTL.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl_seconds` - Optional TTL in seconds
    pub fn new(value: StoredValue, ttl_seconds: Option<u64>) -> Self {
        Self {
            value,
            expires_at: ttl_seconds.map(expiry_from_now),
        }
    }

    // == Is Expired ==
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }

    /// Re-arms the expiry relative to now.
    pub fn expire_in(&mut self, ttl_seconds: u64) {
        self.expires_at = Some(expiry_from_now(ttl_seconds));
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }

    /// Remaining TTL in whole seconds, rounded up the way Redis reports it.
    pub fn ttl_remaining(&self) -> Option<u64> {
        self.ttl_remaining_ms().map(|ms| ms.div_ceil(1000))
    }
}

// == Utility Functions ==
/// Absolute expiry for a TTL, saturating instead of wrapping into the past.
fn expiry_from_now(ttl_seconds: u64) -> u64 {
    current_timestamp_ms().saturating_add(ttl_seconds.saturating_mul(1000))
}

/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
