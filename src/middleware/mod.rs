//! HTTP Middleware Module
//!
//! Caching and rate limiting applied to request/response cycles so route
//! handlers need no cache awareness. Requests pass through the rate limiter
//! first, then the response cache, then the handler; invalidation runs after
//! successful mutations.
//!
//! # Middleware
//! - `rate_limit` - 429 for callers over budget
//! - `cache_responses` - serve/populate cached GET responses
//! - `invalidate_on_success` - clear patterns after successful writes

pub mod invalidation;
pub mod rate_limit;
pub mod request;
pub mod response_cache;

pub use invalidation::{invalidate_on_success, CacheInvalidation, InvalidationPatterns};
pub use rate_limit::{
    endpoint_key, ip_key, rate_limit, user_key, RateLimitConfig, RateLimitDecision, RateLimiter,
};
pub use request::{is_mutating, AuthenticatedUser, RequestInfo, SessionId};
pub use response_cache::{
    cache_responses, default_response_key, CachedResponse, ResponseCache, ResponseCacheConfig,
    X_CACHE, X_CACHE_KEY,
};
