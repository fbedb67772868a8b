//! Degraded-service responses.
//!
//! Every backend-facing failure ends here: an HTTP 503 with a small JSON body
//! naming the affected service.

use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::schema::FallbackConfig;

/// Fallback used by routes without a circuit breaker filter.
pub const DEFAULT_FALLBACK: &str = "/fallback/default";

/// Built-in fallbacks as (path, message).
pub const BUILTIN_FALLBACKS: &[(&str, &str)] = &[
    (
        "/fallback/auth",
        "Authentication service is currently unavailable. Please try again later.",
    ),
    (
        "/fallback/customer",
        "Customer service is currently unavailable. Please try again later.",
    ),
    (
        DEFAULT_FALLBACK,
        "The requested service is currently unavailable. Please try again later.",
    ),
];

/// Strip the `forward:` prefix from a fallback uri.
pub fn fallback_path(uri: &str) -> &str {
    uri.strip_prefix("forward:").unwrap_or(uri).trim()
}

/// JSON body of a fallback response.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackBody {
    pub timestamp: String,
    pub status: u16,
    pub error: &'static str,
    pub message: String,
}

/// Maps fallback paths to messages and renders the 503 response.
#[derive(Debug, Clone)]
pub struct FallbackResponder {
    messages: HashMap<String, String>,
}

impl Default for FallbackResponder {
    fn default() -> Self {
        Self {
            messages: BUILTIN_FALLBACKS
                .iter()
                .map(|(path, message)| (path.to_string(), message.to_string()))
                .collect(),
        }
    }
}

impl FallbackResponder {
    /// Built-ins plus configured entries. Configured entries win on conflict.
    pub fn from_config(configs: &[FallbackConfig]) -> Self {
        let mut responder = Self::default();
        for config in configs {
            responder
                .messages
                .insert(config.path.clone(), config.message.clone());
        }
        responder
    }

    pub fn lookup(&self, path: &str) -> Option<&str> {
        self.messages.get(path).map(String::as_str)
    }

    /// Body for `path`, using the default message when `path` is unknown.
    pub fn body(&self, path: &str) -> FallbackBody {
        let message = self
            .lookup(path)
            .or_else(|| self.lookup(DEFAULT_FALLBACK))
            .unwrap_or("Service unavailable.")
            .to_string();

        FallbackBody {
            timestamp: chrono::Local::now()
                .format("%Y-%m-%dT%H:%M:%S%.3f")
                .to_string(),
            status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
            error: "Service Unavailable",
            message,
        }
    }

    pub fn respond(&self, path: &str) -> Response {
        (StatusCode::SERVICE_UNAVAILABLE, Json(self.body(path))).into_response()
    }

    /// Known fallback paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.messages.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_forward_prefix() {
        assert_eq!(fallback_path("forward:/fallback/auth"), "/fallback/auth");
        assert_eq!(fallback_path("/fallback/auth"), "/fallback/auth");
    }

    #[test]
    fn customer_body() {
        let body = FallbackResponder::default().body("/fallback/customer");

        assert_eq!(body.status, 503);
        assert_eq!(body.error, "Service Unavailable");
        assert_eq!(
            body.message,
            "Customer service is currently unavailable. Please try again later."
        );
        // e.g. 2024-05-01T12:30:45.123
        assert!(chrono::NaiveDateTime::parse_from_str(&body.timestamp, "%Y-%m-%dT%H:%M:%S%.3f").is_ok());
        assert_eq!(body.timestamp.len(), 23);
    }

    #[test]
    fn configured_entries_extend_builtins() {
        let responder = FallbackResponder::from_config(&[FallbackConfig {
            path: "/fallback/interactions".into(),
            message: "Interactions are unavailable.".into(),
        }]);

        assert_eq!(responder.lookup("/fallback/interactions"), Some("Interactions are unavailable."));
        assert!(responder.lookup("/fallback/auth").is_some());
        assert_eq!(responder.paths().len(), 4);
    }

    #[tokio::test]
    async fn unknown_path_uses_default_message() {
        let response = FallbackResponder::default().respond("/fallback/nope");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json["message"],
            "The requested service is currently unavailable. Please try again later."
        );
        assert_eq!(json["status"], 503);
    }
}
