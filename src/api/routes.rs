//! API Routes
//!
//! Configures the Axum router with all endpoints.

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_stats_handler, delete_handler, flush_handler, get_handler, health_handler,
    invalidate_handler, redis_health_handler, set_handler, stats_handler, AppState,
};
use crate::middleware::rate_limit;

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - Rate limiting on every `/api` route (health probes are exempt)
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/cache", delete(flush_handler))
        .route("/cache/stats", get(stats_handler).delete(clear_stats_handler))
        .route("/cache/invalidate", post(invalidate_handler))
        .route("/cache/entries", put(set_handler))
        .route(
            "/cache/entries/:key",
            get(get_handler).delete(delete_handler),
        )
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/health/redis", get(redis_health_handler))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
