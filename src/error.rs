//! Gateway error kinds.
//!
//! # Design Decisions
//! - One enum for everything the request path can produce
//! - Backend-facing kinds never reach the client directly; the engine
//!   converts them into a fallback response
//! - Terminal kinds (no route, oversized body) render themselves via `IntoResponse`

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors produced while routing and dispatching a request.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No route pattern matched the request path.
    #[error("no route matches {method} {path}")]
    NoRouteMatch { method: String, path: String },

    /// The circuit breaker refused the call without contacting the backend.
    #[error("circuit breaker '{name}' is open")]
    BreakerOpen { name: String },

    /// Connection failure, unresolvable service, or a 5xx answer.
    #[error("call to backend '{backend}' failed: {reason}")]
    BackendCallFailure { backend: String, reason: String },

    /// The backend did not answer within the call time limit.
    #[error("call to backend '{backend}' timed out after {}ms", .timeout.as_millis())]
    BackendTimeout { backend: String, timeout: Duration },

    /// A route or filter definition is invalid. Fatal at startup.
    #[error("invalid filter configuration: {0}")]
    FilterConfig(String),

    /// The inbound body exceeded the configured limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl GatewayError {
    /// Whether a retry policy may act on this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::BackendCallFailure { .. } | GatewayError::BackendTimeout { .. }
        )
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::NoRouteMatch { .. } => "no_route",
            GatewayError::BreakerOpen { .. } => "breaker_open",
            GatewayError::BackendCallFailure { .. } => "backend_failure",
            GatewayError::BackendTimeout { .. } => "backend_timeout",
            GatewayError::FilterConfig(_) => "filter_config",
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match &self {
            GatewayError::NoRouteMatch { .. } => StatusCode::NOT_FOUND,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::BreakerOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::BackendCallFailure { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::FilterConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
