//! Request view used by the middleware.
//!
//! The middleware only reads a handful of request fields; they are copied
//! into `RequestInfo` so key generators and conditions stay independent of
//! the full HTTP request type.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, MatchedPath, Request},
    http::{HeaderMap, Method},
};

/// Authenticated user id, inserted into request extensions by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Session id, inserted into request extensions by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

/// The request fields the cache and rate limiting middleware depend on.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    /// Path without query string
    pub path: String,
    /// Path plus query string, as received
    pub original_url: String,
    /// Raw query string
    pub query: Option<String>,
    /// Client address
    pub ip: String,
    /// Route template (`/api/workouts/:id`) once routing has happened
    pub route_path: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl RequestInfo {
    /// Copies the relevant fields out of an axum request.
    ///
    /// The client address is taken from `X-Forwarded-For`, then `X-Real-IP`,
    /// then the socket address when the server was started with connect info.
    pub fn from_request(request: &Request) -> Self {
        let uri = request.uri();
        let path = uri.path().to_string();
        let query = uri.query().map(str::to_string);
        let original_url = match &query {
            Some(q) => format!("{}?{}", path, q),
            None => path.clone(),
        };

        let extensions = request.extensions();
        let socket_ip = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Self {
            method: request.method().clone(),
            path,
            original_url,
            query,
            ip: client_ip(request.headers())
                .or(socket_ip)
                .unwrap_or_else(|| "unknown".to_string()),
            route_path: extensions
                .get::<MatchedPath>()
                .map(|matched| matched.as_str().to_string()),
            user_id: extensions
                .get::<AuthenticatedUser>()
                .map(|AuthenticatedUser(id)| id.clone()),
            session_id: extensions
                .get::<SessionId>()
                .map(|SessionId(id)| id.clone()),
        }
    }

    /// True for verbs that change server state.
    pub fn is_mutating(&self) -> bool {
        is_mutating(&self.method)
    }
}

/// POST, PUT, PATCH and DELETE.
pub fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
}
