//! API Module
//!
//! HTTP handlers and routing for the cache service.
//!
//! # Endpoints
//! - `GET /health` - Store health probe
//! - `GET /health/redis` - Health probe with per-namespace key counts
//! - `GET /api/cache/stats` - Hit/miss statistics
//! - `DELETE /api/cache/stats` - Reset statistics
//! - `POST /api/cache/invalidate` - Delete keys matching a pattern
//! - `DELETE /api/cache` - Flush the cache database
//! - `PUT /api/cache/entries` - Store a value
//! - `GET /api/cache/entries/:key` - Read a value
//! - `DELETE /api/cache/entries/:key` - Delete a value

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
