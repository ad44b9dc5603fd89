//! # Cache Invalidation Middleware
//!
//! Clears key patterns after successful mutations. Invalidation runs on a
//! spawned task once the response has been handed back, so clients may see
//! stale entries for a short moment after a write.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::request::RequestInfo;
use crate::cache::{CacheOptions, CacheService};

pub type PatternResolver = Arc<dyn Fn(&RequestInfo) -> Vec<String> + Send + Sync>;

/// Where the patterns to clear come from.
#[derive(Clone)]
pub enum InvalidationPatterns {
    Static(Vec<String>),
    Derived(PatternResolver),
}

impl InvalidationPatterns {
    pub fn resolve(&self, info: &RequestInfo) -> Vec<String> {
        match self {
            InvalidationPatterns::Static(patterns) => patterns.clone(),
            InvalidationPatterns::Derived(resolver) => resolver(info),
        }
    }
}

/// Shared state of the invalidation middleware.
#[derive(Clone)]
pub struct CacheInvalidation {
    cache: CacheService,
    patterns: InvalidationPatterns,
}

impl CacheInvalidation {
    /// Clears a fixed set of patterns.
    pub fn new<I, S>(cache: CacheService, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cache,
            patterns: InvalidationPatterns::Static(patterns.into_iter().map(Into::into).collect()),
        }
    }

    /// Derives the patterns from each request.
    pub fn derived<F>(cache: CacheService, resolver: F) -> Self
    where
        F: Fn(&RequestInfo) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            cache,
            patterns: InvalidationPatterns::Derived(Arc::new(resolver)),
        }
    }

    /// Spawns deletion of every resolved pattern.
    pub fn spawn(&self, info: &RequestInfo) -> JoinHandle<u64> {
        let patterns = self.patterns.resolve(info);
        let cache = self.cache.clone();
        tokio::spawn(async move {
            let options = CacheOptions::default();
            let mut total = 0;
            for pattern in patterns {
                match cache.invalidate_pattern(&pattern, &options).await {
                    Ok(removed) => {
                        debug!("Invalidated {} keys for pattern {}", removed, pattern);
                        total += removed;
                    }
                    Err(e) => warn!("Cache invalidation failed for {}: {}", pattern, e),
                }
            }
            total
        })
    }
}

/// Middleware function: after a successful POST/PUT/PATCH/DELETE, clear the
/// configured patterns.
pub async fn invalidate_on_success(
    State(invalidation): State<CacheInvalidation>,
    request: Request,
    next: Next,
) -> Response {
    let info = RequestInfo::from_request(&request);
    let response = next.run(request).await;

    if info.is_mutating() && response.status().is_success() {
        invalidation.spawn(&info);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::http::Method;

    fn info(path: &str) -> RequestInfo {
        RequestInfo {
            method: Method::PUT,
            path: path.to_string(),
            original_url: path.to_string(),
            query: None,
            ip: "127.0.0.1".into(),
            route_path: None,
            user_id: Some("u1".into()),
            session_id: None,
        }
    }

    #[test]
    fn test_derived_patterns() {
        let patterns = InvalidationPatterns::Derived(Arc::new(|i: &RequestInfo| {
            vec![format!("http:GET:{}*", i.path)]
        }));
        assert_eq!(
            patterns.resolve(&info("/api/workouts/3")),
            vec!["http:GET:/api/workouts/3*".to_string()]
        );
    }

    #[tokio::test]
    async fn test_spawn_clears_all_patterns() {
        let cache = CacheService::new(Arc::new(MemoryStore::new()), "t:");
        let opts = CacheOptions::default();
        cache.set("workouts:1", &1, &opts).await.unwrap();
        cache.set("workouts:2", &2, &opts).await.unwrap();
        cache.set("users:1", &3, &opts).await.unwrap();
        cache.set("stats", &4, &opts).await.unwrap();

        let invalidation = CacheInvalidation::new(cache.clone(), ["workouts:*", "stats", "nothing:*"]);
        let removed = invalidation.spawn(&info("/api/workouts")).await.unwrap();

        assert_eq!(removed, 3);
        assert!(cache.exists("users:1", &opts).await.unwrap());
    }
}
