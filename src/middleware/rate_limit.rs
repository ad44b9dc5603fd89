//! # Rate Limiting Middleware
//!
//! Counter-with-expiry limiter. Each admitted request increments the
//! caller's counter and re-arms its expiry to the full window in one atomic
//! store command, so a steady stream of requests keeps the window sliding
//! forward instead of resetting on fixed boundaries.
//!
//! The budget is read first so rejected callers are not charged. Concurrent
//! requests can all pass that read; the increment then decides, and a request
//! whose increment lands past `max` is refunded and rejected. During such a
//! burst a request may be rejected by a charge that is refunded a moment
//! later, but more than `max` requests are never admitted per window.
//!
//! One limiter serves every granularity; only the key generator changes:
//! - `RateLimitConfig::new` keys by client IP
//! - `RateLimitConfig::per_user` keys by authenticated user, falling back to IP
//! - `RateLimitConfig::per_endpoint` keys by route and IP
//!
//! If the store fails the request is let through.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, warn};

use super::request::RequestInfo;
use crate::cache::{CacheOptions, CacheService};
use crate::error::{CacheError, Result};
use crate::store::TTL_PERSISTENT;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

pub type RateLimitKeyGenerator = Arc<dyn Fn(&RequestInfo) -> String + Send + Sync>;
pub type LimitReachedCallback = Arc<dyn Fn(&RequestInfo) + Send + Sync>;

/// Key by client IP.
pub fn ip_key(info: &RequestInfo) -> String {
    format!("ip:{}", info.ip)
}

/// Key by authenticated user, or by IP for anonymous callers.
pub fn user_key(info: &RequestInfo) -> String {
    match &info.user_id {
        Some(user) => format!("user:{}", user),
        None => ip_key(info),
    }
}

/// Key by route template (or path before routing) and IP.
pub fn endpoint_key(info: &RequestInfo) -> String {
    let route = info.route_path.as_deref().unwrap_or(&info.path);
    format!("endpoint:{}:{}", route, info.ip)
}

// == Config ==
#[derive(Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    /// Requests admitted per window
    pub max: u64,
    pub key_generator: RateLimitKeyGenerator,
    /// Refund requests that end with a status below 400
    pub skip_successful_requests: bool,
    /// Refund requests that end with a status of 400 or above
    pub skip_failed_requests: bool,
    pub on_limit_reached: Option<LimitReachedCallback>,
    /// Error message of the 429 body
    pub message: String,
}

impl RateLimitConfig {
    /// Per-IP limiter.
    pub fn new(window: Duration, max: u64) -> Self {
        Self {
            window,
            max,
            key_generator: Arc::new(ip_key),
            skip_successful_requests: false,
            skip_failed_requests: false,
            on_limit_reached: None,
            message: "Too many requests, please try again later.".to_string(),
        }
    }

    pub fn per_user(window: Duration, max: u64) -> Self {
        Self::new(window, max).key_generator(user_key)
    }

    pub fn per_endpoint(window: Duration, max: u64) -> Self {
        Self::new(window, max).key_generator(endpoint_key)
    }

    pub fn key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&RequestInfo) -> String + Send + Sync + 'static,
    {
        self.key_generator = Arc::new(generator);
        self
    }

    pub fn skip_successful_requests(mut self, skip: bool) -> Self {
        self.skip_successful_requests = skip;
        self
    }

    pub fn skip_failed_requests(mut self, skip: bool) -> Self {
        self.skip_failed_requests = skip;
        self
    }

    pub fn on_limit_reached<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RequestInfo) + Send + Sync + 'static,
    {
        self.on_limit_reached = Some(Arc::new(callback));
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Window length in whole seconds, at least one.
    pub fn window_secs(&self) -> u64 {
        let millis = self.window.as_millis() as u64;
        millis.div_ceil(1000).max(1)
    }
}

// == Decision ==
/// Outcome of checking one request.
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitDecision {
    Allowed {
        key: String,
        limit: u64,
        remaining: u64,
        /// Unix seconds at which the window ends
        reset_at: i64,
    },
    Limited {
        limit: u64,
        retry_after: u64,
        reset_at: i64,
    },
    /// The store failed; the request goes through unaccounted
    Bypassed,
}

// == Rate Limiter ==
#[derive(Clone)]
pub struct RateLimiter {
    cache: CacheService,
    config: Arc<RateLimitConfig>,
}

impl RateLimiter {
    /// `cache` should point at the rate limit namespace.
    pub fn new(cache: CacheService, config: RateLimitConfig) -> Result<Self> {
        if config.max == 0 {
            return Err(CacheError::InvalidArgument(
                "rate limit max must be positive".into(),
            ));
        }
        if config.window.is_zero() {
            return Err(CacheError::InvalidArgument(
                "rate limit window must be positive".into(),
            ));
        }
        Ok(Self {
            cache,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Checks the caller's budget and charges it when admitted.
    pub async fn check(&self, info: &RequestInfo) -> RateLimitDecision {
        let key = (self.config.key_generator)(info);
        let options = CacheOptions::default();
        let window = self.config.window_secs();
        let limit = self.config.max;

        let current = match self.cache.peek::<i64>(&key, &options).await {
            Ok(count) => count.unwrap_or(0),
            Err(e) => {
                warn!("Rate limit store unavailable, allowing request: {}", e);
                return RateLimitDecision::Bypassed;
            }
        };

        if current >= limit as i64 {
            let retry_after = match self.cache.ttl(&key, &options).await {
                Ok(ttl) if ttl > 0 => ttl as u64,
                Ok(TTL_PERSISTENT) => {
                    // A counter without expiry would block the caller forever
                    warn!("Rate limit counter {} had no expiry, re-arming", key);
                    if let Err(e) = self.cache.expire(&key, window, &options).await {
                        warn!("Failed to re-arm rate limit window for {}: {}", key, e);
                    }
                    window
                }
                _ => window,
            };
            debug!("Rate limit exceeded for {}", key);
            return self.limited(retry_after);
        }

        let count = match self.cache.incr_with_expiry(&key, 1, window, &options).await {
            Ok(count) => count,
            Err(e) => {
                warn!("Rate limit store unavailable, allowing request: {}", e);
                return RateLimitDecision::Bypassed;
            }
        };

        if count > limit as i64 {
            // Lost a race with concurrent requests for the last slot
            if let Err(e) = self.cache.incr(&key, -1, &options).await {
                warn!("Failed to refund rate limit charge for {}: {}", key, e);
            }
            debug!("Rate limit exceeded for {} ({} concurrent)", key, count);
            return self.limited(window);
        }

        RateLimitDecision::Allowed {
            key,
            limit,
            remaining: limit.saturating_sub(count.max(0) as u64),
            reset_at: now_secs() + window as i64,
        }
    }

    fn limited(&self, retry_after: u64) -> RateLimitDecision {
        RateLimitDecision::Limited {
            limit: self.config.max,
            retry_after,
            reset_at: now_secs() + retry_after as i64,
        }
    }

    /// Refunds the charge of a finished request when the accounting policy
    /// skips requests with this status.
    pub async fn settle(&self, key: &str, status: StatusCode) {
        let failed = status.is_client_error() || status.is_server_error();
        let refund = if failed {
            self.config.skip_failed_requests
        } else {
            self.config.skip_successful_requests
        };
        if !refund {
            return;
        }

        let options = CacheOptions::default();
        match self.cache.incr(key, -1, &options).await {
            // The window expired in between; drop the stray negative counter
            Ok(count) if count < 0 => {
                if let Err(e) = self.cache.del(key, &options).await {
                    warn!("Failed to drop stray rate limit counter {}: {}", key, e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to refund rate limit charge for {}: {}", key, e),
        }
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

fn header_value(value: impl ToString) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

fn set_limit_headers(headers: &mut HeaderMap, limit: u64, remaining: u64, reset_at: i64) {
    headers.insert(X_RATELIMIT_LIMIT, header_value(limit));
    headers.insert(X_RATELIMIT_REMAINING, header_value(remaining));
    headers.insert(X_RATELIMIT_RESET, header_value(reset_at));
}

/// Middleware function: reject over-budget callers with 429 before they
/// reach any handler.
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let info = RequestInfo::from_request(&request);

    match limiter.check(&info).await {
        RateLimitDecision::Bypassed => next.run(request).await,
        RateLimitDecision::Limited {
            limit,
            retry_after,
            reset_at,
        } => {
            if let Some(callback) = &limiter.config.on_limit_reached {
                callback(&info);
            }
            let body = Json(json!({
                "success": false,
                "error": limiter.config.message,
                "retryAfter": retry_after,
            }));
            let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            let headers = response.headers_mut();
            set_limit_headers(headers, limit, 0, reset_at);
            headers.insert(header::RETRY_AFTER, header_value(retry_after));
            response
        }
        RateLimitDecision::Allowed {
            key,
            limit,
            remaining,
            reset_at,
        } => {
            let mut response = next.run(request).await;
            limiter.settle(&key, response.status()).await;
            set_limit_headers(response.headers_mut(), limit, remaining, reset_at);
            response
        }
    }
}
