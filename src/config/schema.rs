//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route definitions, evaluated in declaration order.
    pub routes: Vec<RouteConfig>,

    /// Static service table used by the default resolver.
    pub services: Vec<ServiceConfig>,

    /// Extra fallback responses on top of the built-in ones.
    pub fallbacks: Vec<FallbackConfig>,

    /// Circuit breaker defaults shared by every breaker instance.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Inbound timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin listener settings.
    pub admin: AdminConfig,

    /// Request limits.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A route mapping a path pattern to a backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Unique route identifier.
    pub id: String,

    /// Path pattern: a regex, or a prefix ending in `/**`.
    pub path: String,

    /// Backend target, `lb://service` or `http://host:port`.
    pub uri: String,

    /// Restrict the route to these methods. Empty means any.
    #[serde(default)]
    pub methods: Vec<String>,

    /// Filters applied in declared order.
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

/// A filter attached to a route.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    CircuitBreaker {
        name: String,
        /// Fallback location, e.g. `forward:/fallback/auth`.
        fallback_uri: String,
    },
    RewritePath {
        regexp: String,
        replacement: String,
    },
    Retry {
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
        #[serde(default = "default_retry_methods")]
        methods: Vec<String>,
        #[serde(default)]
        backoff: BackoffConfig,
    },
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

/// Exponential backoff settings for a retry filter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub first_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub factor: f64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            first_backoff_ms: 100,
            max_backoff_ms: 1000,
            factor: 2.0,
            jitter: true,
        }
    }
}

/// A logical service and the addresses it resolves to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service name referenced by `lb://` route targets.
    pub name: String,

    /// Backend addresses (e.g., "127.0.0.1:8082").
    pub addresses: Vec<String>,
}

/// An additional fallback response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallbackConfig {
    /// Path the fallback is served under, e.g. "/fallback/interactions".
    pub path: String,

    /// Human readable message placed in the JSON body.
    pub message: String,
}

/// Circuit breaker and time limiter defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of outcomes kept in the sliding window.
    pub sliding_window_size: usize,

    /// Failure percentage at which the breaker opens.
    pub failure_rate_threshold: f32,

    /// Time spent open before trial calls are allowed, in milliseconds.
    pub wait_duration_in_open_state_ms: u64,

    /// Number of trial calls allowed while half-open.
    pub permitted_calls_in_half_open_state: u32,

    /// Per-call time limit in milliseconds.
    pub call_timeout_ms: u64,

    /// Calls at least this slow count against the failure rate.
    /// Defaults to the call timeout.
    pub slow_call_duration_threshold_ms: Option<u64>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            sliding_window_size: 10,
            failure_rate_threshold: 50.0,
            wait_duration_in_open_state_ms: 10_000,
            permitted_calls_in_half_open_state: 5,
            call_timeout_ms: 5_000,
            slow_call_duration_threshold_ms: None,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for a whole inbound request, retries included, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained requests per second per key.
    pub requests_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,

    /// Key resolver: "client-address" or "forwarded-for".
    pub key_resolver: String,

    /// Upper bound on buckets kept at once.
    pub max_tracked_keys: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 100,
            burst_size: 50,
            key_resolver: "client-address".to_string(),
            max_tracked_keys: 100_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin listener.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin listener bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum buffered request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
