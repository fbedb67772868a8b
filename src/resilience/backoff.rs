//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::error::GatewayError;

/// Backoff settings of a retry filter.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffSpec {
    pub first_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl BackoffSpec {
    /// Create a backoff spec, enforcing `first > 0`, `multiplier >= 1` and `max >= first`.
    pub fn new(
        first_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
        jitter: bool,
    ) -> Result<Self, GatewayError> {
        if first_interval.is_zero() {
            return Err(GatewayError::FilterConfig("backoff first interval must be > 0".into()));
        }
        if !(multiplier >= 1.0) {
            return Err(GatewayError::FilterConfig("backoff multiplier must be >= 1".into()));
        }
        if max_interval < first_interval {
            return Err(GatewayError::FilterConfig(
                "backoff max interval must be >= first interval".into(),
            ));
        }
        Ok(Self {
            first_interval,
            max_interval,
            multiplier,
            jitter,
        })
    }

    /// Capped exponential delay before retry `attempt`, without jitter.
    ///
    /// Attempt 0 is the initial call and is never delayed.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let first_nanos = self.first_interval.as_nanos() as f64;
        let max_nanos = self.max_interval.as_nanos() as f64;
        let delay_nanos = (first_nanos * self.multiplier.powi(exponent)).min(max_nanos);

        Duration::from_nanos(delay_nanos.round() as u64)
    }

    /// Delay before retry `attempt`, uniformly jittered over `[0, base]` when enabled.
    pub fn delay(&self, attempt: u32) -> Duration {
        let capped = self.base_delay(attempt);
        if !self.jitter || capped.is_zero() {
            return capped;
        }

        let max_ms = capped.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
