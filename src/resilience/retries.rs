//! Retry logic.
//!
//! # Responsibilities
//! - Decide if a failed attempt is retried (method, error kind, attempt budget)
//! - Compute the delay before the next attempt
//!
//! # Design Decisions
//! - Only methods listed on the route's retry filter are retried
//! - Breaker rejections are never retried; only call failures and timeouts
//! - Attempt 0 is the initial call; `max_attempts` caps the total

use std::collections::HashSet;
use std::time::Duration;

use axum::http::Method;

use crate::error::GatewayError;
use crate::resilience::backoff::BackoffSpec;

/// Retry policy of a single route.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    methods: HashSet<Method>,
    backoff: BackoffSpec,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, methods: HashSet<Method>, backoff: BackoffSpec) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            methods,
            backoff,
        }
    }

    /// Whether the attempt numbered `attempt` (0 = initial call) that just
    /// failed with `last_error` should be followed by another one.
    pub fn should_retry(&self, attempt: u32, method: &Method, last_error: &GatewayError) -> bool {
        last_error.is_retryable()
            && self.methods.contains(method)
            && attempt.saturating_add(1) < self.max_attempts
    }

    /// Delay to wait before attempt number `attempt`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn methods(&self) -> &HashSet<Method> {
        &self.methods
    }
}
