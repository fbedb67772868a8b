//! Timeout enforcement and outcome classification.
//!
//! # Responsibilities
//! - Bound every backend call with the configured time limit
//! - Classify finished calls into breaker outcomes
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the call future is dropped on expiry
//! - Timeout errors are distinct from other call failures
//! - A call slower than the slow-call threshold still returns its response,
//!   but counts against the breaker's failure rate

use std::future::Future;
use std::time::Duration;

use axum::http::StatusCode;

use crate::config::schema::CircuitBreakerConfig;
use crate::error::GatewayError;
use crate::resilience::circuit_breaker::CallOutcome;

/// Per-call time limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallLimits {
    pub call_timeout: Duration,
    pub slow_call_threshold: Duration,
}

impl Default for CallLimits {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for CallLimits {
    fn from(config: &CircuitBreakerConfig) -> Self {
        let call_timeout = Duration::from_millis(config.call_timeout_ms);
        Self {
            call_timeout,
            slow_call_threshold: config
                .slow_call_duration_threshold_ms
                .map(Duration::from_millis)
                .unwrap_or(call_timeout),
        }
    }
}

/// Run a backend call under the time limit.
pub async fn with_call_timeout<T, F>(
    limit: Duration,
    backend: &str,
    call: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::BackendTimeout {
            backend: backend.to_string(),
            timeout: limit,
        }),
    }
}

/// Classify a completed call.
pub fn classify(status: StatusCode, elapsed: Duration, limits: &CallLimits) -> CallOutcome {
    if status.is_server_error() {
        CallOutcome::Failure
    } else if elapsed >= limits.slow_call_threshold {
        CallOutcome::SlowSuccess
    } else {
        CallOutcome::Success
    }
}
