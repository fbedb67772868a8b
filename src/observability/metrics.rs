//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_retries_total` (counter): retry attempts by route
//! - `gateway_fallbacks_total` (counter): fallback responses by route, reason
//! - `gateway_breaker_transitions_total` (counter): state changes by breaker, state
//! - `gateway_breaker_rejections_total` (counter): calls refused by an open breaker
//! - `gateway_rate_limited_total` (counter): requests refused by the rate limiter

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Label used when no route matched.
pub const NO_ROUTE: &str = "none";

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let latency = start.elapsed().as_secs_f64();

    ::metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "route" => route.to_string()
    )
    .increment(1);

    ::metrics::histogram!(
        "gateway_request_duration_seconds",
        "route" => route.to_string()
    )
    .record(latency);
}

pub fn record_retry(route: &str) {
    ::metrics::counter!("gateway_retries_total", "route" => route.to_string()).increment(1);
}

/// Record a fallback response. `reason` is a [`GatewayError::kind`](crate::error::GatewayError::kind) label.
pub fn record_fallback(route: &str, reason: &str) {
    ::metrics::counter!(
        "gateway_fallbacks_total",
        "route" => route.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub fn record_breaker_transition(breaker: &str, state: &str) {
    ::metrics::counter!(
        "gateway_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "state" => state.to_string()
    )
    .increment(1);
}

pub fn record_breaker_rejection(breaker: &str) {
    ::metrics::counter!(
        "gateway_breaker_rejections_total",
        "breaker" => breaker.to_string()
    )
    .increment(1);
}

pub fn record_rate_limited(key_resolver: &str) {
    ::metrics::counter!(
        "gateway_rate_limited_total",
        "key_resolver" => key_resolver.to_string()
    )
    .increment(1);
}
