//! # Response Cache Middleware
//!
//! Serves cached bodies for idempotent requests and fills the cache from
//! responses produced downstream. Cache failures are logged and never reach
//! the client.
//!
//! ```ignore
//! let responses = ResponseCache::new(cache.clone(), ResponseCacheConfig::new(300));
//! let app = Router::new()
//!     .route("/api/workouts", get(list_workouts))
//!     .layer(middleware::from_fn_with_state(responses, cache_responses));
//! ```

use std::sync::Arc;

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::request::RequestInfo;
use crate::cache::{CacheOptions, CacheService};

/// `X-Cache: HIT|MISS`
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
/// Cache key used for the response
pub const X_CACHE_KEY: HeaderName = HeaderName::from_static("x-cache-key");

pub type KeyGenerator = Arc<dyn Fn(&RequestInfo) -> String + Send + Sync>;
pub type RequestCondition = Arc<dyn Fn(&RequestInfo) -> bool + Send + Sync>;

/// Default key: method, path and query, so different query strings are
/// cached independently.
pub fn default_response_key(info: &RequestInfo) -> String {
    format!("http:{}:{}", info.method, info.original_url)
}

// == Config ==
/// Response caching policy.
#[derive(Clone)]
pub struct ResponseCacheConfig {
    /// Seconds a cached response lives
    pub ttl: u64,
    pub key_generator: KeyGenerator,
    /// Requests failing the condition bypass the cache entirely
    pub condition: Option<RequestCondition>,
    /// Methods that always bypass the cache
    pub skip_methods: Vec<Method>,
    /// Statuses never stored, in addition to every 4xx/5xx
    pub skip_status_codes: Vec<u16>,
    /// Bodies larger than this are passed through uncached
    pub max_body_bytes: usize,
}

impl ResponseCacheConfig {
    pub fn new(ttl: u64) -> Self {
        Self {
            ttl,
            key_generator: Arc::new(default_response_key),
            condition: None,
            skip_methods: vec![Method::POST, Method::PUT, Method::PATCH, Method::DELETE],
            skip_status_codes: vec![204, 206],
            max_body_bytes: 1024 * 1024,
        }
    }

    pub fn key_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&RequestInfo) -> String + Send + Sync + 'static,
    {
        self.key_generator = Arc::new(generator);
        self
    }

    pub fn condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&RequestInfo) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn skip_methods(mut self, methods: Vec<Method>) -> Self {
        self.skip_methods = methods;
        self
    }

    pub fn skip_status_codes(mut self, codes: Vec<u16>) -> Self {
        self.skip_status_codes = codes;
        self
    }

    pub fn max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// True when the response announces a body over the cap, so it can be
    /// streamed through without reading it.
    fn announced_too_large(&self, response: &Response) -> bool {
        let cap = self.max_body_bytes as u64;
        let declared = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        declared.map_or(false, |len| len > cap) || response.body().size_hint().lower() > cap
    }

    fn applies_to(&self, info: &RequestInfo) -> bool {
        if self.skip_methods.contains(&info.method) {
            return false;
        }
        if !matches!(info.method, Method::GET | Method::HEAD) {
            return false;
        }
        self.condition.as_ref().map_or(true, |condition| condition(info))
    }

    fn stores_status(&self, status: StatusCode) -> bool {
        status.is_success() && !self.skip_status_codes.contains(&status.as_u16())
    }
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self::new(300)
    }
}

/// Response as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub body: String,
}

impl CachedResponse {
    fn into_response(self, key: &str) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        match self
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            Some(content_type) => {
                headers.insert(header::CONTENT_TYPE, content_type);
            }
            None => {
                headers.remove(header::CONTENT_TYPE);
            }
        }
        tag(&mut response, "HIT", key);
        response
    }
}

fn tag(response: &mut Response, outcome: &'static str, key: &str) {
    let headers = response.headers_mut();
    headers.insert(X_CACHE, HeaderValue::from_static(outcome));
    if let Ok(value) = HeaderValue::from_str(key) {
        headers.insert(X_CACHE_KEY, value);
    }
}

// == Body Capture ==
enum CapturedBody {
    Complete(Bytes),
    /// Over the cap; what was read is replayed ahead of the unread remainder
    Oversized(Body),
}

/// Reads at most `cap + 1` chunks' worth of bytes. Larger bodies are handed
/// back as a stream instead of being held in memory.
async fn capture_body(body: Body, cap: usize) -> Result<CapturedBody, axum::Error> {
    let mut stream = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut len = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        len += chunk.len();
        chunks.push(chunk);
        if len > cap {
            let read = futures::stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
            return Ok(CapturedBody::Oversized(Body::from_stream(read.chain(stream))));
        }
    }

    let bytes = match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.swap_remove(0),
        _ => Bytes::from(chunks.concat()),
    };
    Ok(CapturedBody::Complete(bytes))
}

// == Layer State ==
/// Shared state of the response caching middleware.
#[derive(Clone)]
pub struct ResponseCache {
    cache: CacheService,
    config: Arc<ResponseCacheConfig>,
}

impl ResponseCache {
    pub fn new(cache: CacheService, config: ResponseCacheConfig) -> Self {
        Self {
            cache,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ResponseCacheConfig {
        &self.config
    }

    async fn store(&self, key: &str, cached: &CachedResponse) {
        let options = CacheOptions::default().with_ttl(self.config.ttl);
        match self.cache.set(key, cached, &options).await {
            Ok(()) => debug!("Cached response for key: {}", key),
            Err(e) => warn!("Failed to cache response for {}: {}", key, e),
        }
    }
}

/// Middleware function: serve from cache on hit, otherwise run the handler
/// and capture its response.
pub async fn cache_responses(
    State(layer): State<ResponseCache>,
    request: Request,
    next: Next,
) -> Response {
    let info = RequestInfo::from_request(&request);
    if !layer.config.applies_to(&info) {
        return next.run(request).await;
    }

    let key = (layer.config.key_generator)(&info);
    let options = CacheOptions::default();

    if let Some(cached) = layer.cache.get::<CachedResponse>(&key, &options).await {
        debug!("Serving cached response for key: {}", key);
        return cached.into_response(&key);
    }

    let mut response = next.run(request).await;
    if !layer.config.stores_status(response.status()) {
        tag(&mut response, "MISS", &key);
        return response;
    }
    if layer.config.announced_too_large(&response) {
        debug!("Not caching oversized response for key: {}", key);
        tag(&mut response, "MISS", &key);
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match capture_body(body, layer.config.max_body_bytes).await {
        Ok(CapturedBody::Complete(bytes)) => bytes,
        Ok(CapturedBody::Oversized(body)) => {
            debug!("Not caching oversized response for key: {}", key);
            let mut response = Response::from_parts(parts, body);
            tag(&mut response, "MISS", &key);
            return response;
        }
        Err(e) => {
            error!("Failed to read response body for {}: {}", key, e);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    match std::str::from_utf8(&bytes) {
        Ok(text) => {
            let cached = CachedResponse {
                status: parts.status.as_u16(),
                content_type: parts
                    .headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                body: text.to_string(),
            };
            layer.store(&key, &cached).await;
        }
        Err(_) => debug!("Not caching binary response for key: {}", key),
    }

    let mut response = Response::from_parts(parts, Body::from(bytes));
    tag(&mut response, "MISS", &key);
    response
}
