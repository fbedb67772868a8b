//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing services and fallbacks)
//! - Validate value ranges (timeouts > 0, thresholds within 0..=100)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::{BackoffConfig, FilterConfig, GatewayConfig, RouteConfig};
use crate::proxy::fallback::{fallback_path, BUILTIN_FALLBACKS};
use crate::routing::matcher::PathPattern;
use crate::routing::rewrite::RewritePath;
use crate::routing::route::BackendTarget;
use crate::security::key_resolver::KEY_RESOLVERS;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let services = validate_services(config, &mut errors);
    validate_breaker_defaults(config, &mut errors);

    let mut fallbacks: HashSet<String> = BUILTIN_FALLBACKS
        .iter()
        .map(|(path, _)| path.to_string())
        .collect();
    for (i, fallback) in config.fallbacks.iter().enumerate() {
        if !fallback.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("fallbacks[{}].path", i),
                "must start with '/'",
            ));
        }
        fallbacks.insert(fallback.path.clone());
    }

    let mut route_ids = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        if !route_ids.insert(route.id.as_str()) {
            errors.push(ValidationError::new(
                format!("routes[{}].id", i),
                format!("duplicate route id '{}'", route.id),
            ));
        }
        validate_route(i, route, &services, &fallbacks, &mut errors);
    }

    if config.rate_limit.enabled {
        if !KEY_RESOLVERS.contains(&config.rate_limit.key_resolver.as_str()) {
            errors.push(ValidationError::new(
                "rate_limit.key_resolver",
                format!("unknown key resolver '{}'", config.rate_limit.key_resolver),
            ));
        }
        if config.rate_limit.requests_per_second == 0 || config.rate_limit.burst_size == 0 {
            errors.push(ValidationError::new(
                "rate_limit",
                "requests_per_second and burst_size must be > 0",
            ));
        }
        if config.rate_limit.max_tracked_keys == 0 {
            errors.push(ValidationError::new("rate_limit.max_tracked_keys", "must be > 0"));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_services<'a>(
    config: &'a GatewayConfig,
    errors: &mut Vec<ValidationError>,
) -> HashSet<&'a str> {
    let mut names = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::new(
                format!("services[{}].name", i),
                format!("duplicate service '{}'", service.name),
            ));
        }
        if service.addresses.is_empty() {
            errors.push(ValidationError::new(
                format!("services[{}].addresses", i),
                "at least one address is required",
            ));
        }
        for addr in &service.addresses {
            if addr.parse::<SocketAddr>().is_err() {
                errors.push(ValidationError::new(
                    format!("services[{}].addresses", i),
                    format!("'{}' is not a socket address", addr),
                ));
            }
        }
    }
    names
}

fn validate_breaker_defaults(config: &GatewayConfig, errors: &mut Vec<ValidationError>) {
    let cb = &config.circuit_breaker;
    if cb.sliding_window_size == 0 {
        errors.push(ValidationError::new("circuit_breaker.sliding_window_size", "must be > 0"));
    }
    if !(cb.failure_rate_threshold > 0.0 && cb.failure_rate_threshold <= 100.0) {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_rate_threshold",
            "must be within (0, 100]",
        ));
    }
    if cb.permitted_calls_in_half_open_state == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.permitted_calls_in_half_open_state",
            "must be > 0",
        ));
    }
    if cb.call_timeout_ms == 0 {
        errors.push(ValidationError::new("circuit_breaker.call_timeout_ms", "must be > 0"));
    }
}

fn validate_route(
    index: usize,
    route: &RouteConfig,
    services: &HashSet<&str>,
    fallbacks: &HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    let field = |name: &str| format!("routes[{}].{}", index, name);

    if route.id.trim().is_empty() {
        errors.push(ValidationError::new(field("id"), "must not be empty"));
    }
    if route.path.trim().is_empty() {
        errors.push(ValidationError::new(field("path"), "must not be empty"));
    } else if let Err(e) = PathPattern::compile(&route.path) {
        errors.push(ValidationError::new(field("path"), e.to_string()));
    }

    match BackendTarget::parse(&route.uri) {
        Ok(BackendTarget::Service(name)) if !services.contains(name.as_str()) => {
            errors.push(ValidationError::new(
                field("uri"),
                format!("service '{}' is not declared in [[services]]", name),
            ));
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new(field("uri"), e)),
    }

    check_methods(&field("methods"), &route.methods, errors);

    let mut breakers = 0;
    let mut retries = 0;
    for (j, filter) in route.filters.iter().enumerate() {
        let filter_field = field(&format!("filters[{}]", j));
        match filter {
            FilterConfig::CircuitBreaker { name, fallback_uri } => {
                breakers += 1;
                if name.trim().is_empty() {
                    errors.push(ValidationError::new(&filter_field, "breaker name must not be empty"));
                }
                if !fallbacks.contains(fallback_path(fallback_uri)) {
                    errors.push(ValidationError::new(
                        &filter_field,
                        format!("unknown fallback '{}'", fallback_uri),
                    ));
                }
            }
            FilterConfig::RewritePath { regexp, replacement } => {
                if regexp.is_empty() {
                    errors.push(ValidationError::new(&filter_field, "rewrite regexp must not be empty"));
                } else if let Err(e) = RewritePath::new(regexp, replacement) {
                    errors.push(ValidationError::new(&filter_field, e.to_string()));
                }
            }
            FilterConfig::Retry { max_attempts, methods, backoff } => {
                retries += 1;
                if *max_attempts == 0 {
                    errors.push(ValidationError::new(&filter_field, "max_attempts must be >= 1"));
                }
                check_methods(&filter_field, methods, errors);
                check_backoff(&filter_field, backoff, errors);
            }
        }
    }

    if breakers > 1 {
        errors.push(ValidationError::new(field("filters"), "at most one circuit_breaker filter"));
    }
    if retries > 1 {
        errors.push(ValidationError::new(field("filters"), "at most one retry filter"));
    }
}

fn check_methods(field: &str, methods: &[String], errors: &mut Vec<ValidationError>) {
    for m in methods {
        if Method::from_bytes(m.to_uppercase().as_bytes()).is_err() {
            errors.push(ValidationError::new(field, format!("invalid HTTP method '{}'", m)));
        }
    }
}

fn check_backoff(field: &str, backoff: &BackoffConfig, errors: &mut Vec<ValidationError>) {
    if backoff.first_backoff_ms == 0 {
        errors.push(ValidationError::new(field, "first_backoff_ms must be > 0"));
    }
    if backoff.factor < 1.0 {
        errors.push(ValidationError::new(field, "factor must be >= 1"));
    }
    if backoff.max_backoff_ms < backoff.first_backoff_ms {
        errors.push(ValidationError::new(field, "max_backoff_ms must be >= first_backoff_ms"));
    }
}
