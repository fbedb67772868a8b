//! Request-scoped context.
//!
//! # Responsibilities
//! - Generate the correlation id (UUID v4)
//! - Carry per-request facts from the logging layer into the engine
//! - Mark responses with the route that produced them

use std::net::SocketAddr;
use std::time::Instant;

use axum::http::Method;
use uuid::Uuid;

/// Header carrying the correlation id, inbound to backends and outbound to clients.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Per-request context, stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: Uuid,
    pub method: Method,
    pub path: String,
    pub remote_address: SocketAddr,
    pub start_time: Instant,
    /// Id of the route that matched, once known.
    pub matched_route: Option<String>,
    /// Current attempt, starting at 0.
    pub attempt: u32,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>, remote_address: SocketAddr) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            method,
            path: path.into(),
            remote_address,
            start_time: Instant::now(),
            matched_route: None,
            attempt: 0,
        }
    }
}

/// Response extension naming the route that handled the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute(pub String);
