//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Attempt to call a backend:
//!     → circuit_breaker.rs (acquire permit or reject outright)
//!     → timeouts.rs (bound the call, classify the outcome)
//!     → circuit_breaker.rs (record outcome, maybe transition)
//!     → On failure: retries.rs (retryable? which delay?) using backoff.rs
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - Retries only for methods listed on the route
//! - A breaker rejection short-circuits retries entirely
//! - Breakers are per name, never global

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::BackoffSpec;
pub use circuit_breaker::{
    BreakerSettings, BreakerSnapshot, CallOutcome, CallPermit, CircuitBreaker,
    CircuitBreakerRegistry, CircuitState,
};
pub use retries::RetryPolicy;
pub use timeouts::CallLimits;
