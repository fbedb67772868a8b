//! Route and filter definitions.
//!
//! A route is compiled from its configuration once at startup and never
//! changes afterwards. Filters are plain data: the engine owns the single
//! `match` that gives each variant its behaviour.

use std::collections::HashSet;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use axum::http::Method;
use url::Url;

use crate::config::schema::{FilterConfig, RouteConfig};
use crate::error::GatewayError;
use crate::proxy::fallback::fallback_path;
use crate::resilience::backoff::BackoffSpec;
use crate::resilience::retries::RetryPolicy;
use crate::routing::matcher::{PathPattern, Segments};
use crate::routing::rewrite::RewritePath;

/// Where a route sends its traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    /// `lb://name`, resolved per attempt by the service resolver.
    Service(String),
    /// `http://host:port`, a fixed address.
    Direct(SocketAddr),
}

impl BackendTarget {
    /// Parse a route target URI.
    pub fn parse(uri: &str) -> Result<Self, String> {
        let url = Url::parse(uri).map_err(|e| format!("invalid uri '{}': {}", uri, e))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| format!("uri '{}' has no host", uri))?;

        match url.scheme() {
            "lb" => Ok(BackendTarget::Service(host.to_string())),
            "http" => {
                let port = url.port_or_known_default().unwrap_or(80);
                let host = host.trim_start_matches('[').trim_end_matches(']');
                (host, port)
                    .to_socket_addrs()
                    .ok()
                    .and_then(|mut addrs| addrs.next())
                    .map(BackendTarget::Direct)
                    .ok_or_else(|| format!("cannot resolve '{}:{}'", host, port))
            }
            other => Err(format!("unsupported scheme '{}' (expected lb or http)", other)),
        }
    }

    /// The backend identity used for resolution and logging.
    pub fn identity(&self) -> String {
        match self {
            BackendTarget::Service(name) => name.clone(),
            BackendTarget::Direct(addr) => addr.to_string(),
        }
    }
}

/// A filter attached to a route, applied in declared order.
#[derive(Debug, Clone)]
pub enum FilterSpec {
    CircuitBreaker { name: String, fallback_path: String },
    RewritePath(RewritePath),
    Retry(RetryPolicy),
}

/// A compiled route.
#[derive(Debug, Clone)]
pub struct RouteDefinition {
    pub id: String,
    pub pattern: PathPattern,
    /// Methods this route accepts. Empty means any.
    pub methods: Vec<Method>,
    pub backend: String,
    pub filters: Vec<FilterSpec>,
}

impl RouteDefinition {
    /// Compile a route from configuration.
    pub fn from_config(config: &RouteConfig) -> Result<Self, GatewayError> {
        let pattern = PathPattern::compile(&config.path)?;
        let backend = BackendTarget::parse(&config.uri)
            .map_err(|e| GatewayError::FilterConfig(format!("route '{}': {}", config.id, e)))?
            .identity();
        let methods = parse_methods(&config.methods)?;

        let filters = config
            .filters
            .iter()
            .map(|filter| compile_filter(&config.id, filter))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: config.id.clone(),
            pattern,
            methods,
            backend,
            filters,
        })
    }

    /// Match the request against this route.
    pub fn matches(&self, method: &Method, path: &str) -> Option<Segments> {
        if !self.methods.is_empty() && !self.methods.contains(method) {
            return None;
        }
        self.pattern.captures(path)
    }
}

fn compile_filter(route_id: &str, filter: &FilterConfig) -> Result<FilterSpec, GatewayError> {
    match filter {
        FilterConfig::CircuitBreaker { name, fallback_uri } => Ok(FilterSpec::CircuitBreaker {
            name: name.clone(),
            fallback_path: fallback_path(fallback_uri).to_string(),
        }),
        FilterConfig::RewritePath { regexp, replacement } => {
            Ok(FilterSpec::RewritePath(RewritePath::new(regexp, replacement)?))
        }
        FilterConfig::Retry { max_attempts, methods, backoff } => {
            let backoff = BackoffSpec::new(
                Duration::from_millis(backoff.first_backoff_ms),
                Duration::from_millis(backoff.max_backoff_ms),
                backoff.factor,
                backoff.jitter,
            )?;
            let methods: HashSet<Method> = parse_methods(methods)?.into_iter().collect();
            let policy = RetryPolicy::new(*max_attempts, methods, backoff);

            let unsafe_methods: Vec<&str> = policy
                .methods()
                .iter()
                .filter(|m| !m.is_idempotent() || **m == Method::PUT || **m == Method::DELETE)
                .map(Method::as_str)
                .collect();
            if !unsafe_methods.is_empty() {
                tracing::warn!(
                    route = %route_id,
                    methods = ?unsafe_methods,
                    max_attempts = policy.max_attempts(),
                    "Retries enabled for methods that may not be idempotent on this backend"
                );
            }

            Ok(FilterSpec::Retry(policy))
        }
    }
}

fn parse_methods(methods: &[String]) -> Result<Vec<Method>, GatewayError> {
    methods
        .iter()
        .map(|m| {
            Method::from_bytes(m.to_uppercase().as_bytes())
                .map_err(|_| GatewayError::FilterConfig(format!("invalid HTTP method '{}'", m)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BackoffConfig;

    fn customer_route() -> RouteConfig {
        RouteConfig {
            id: "customer-service".into(),
            path: "/api/customers/**".into(),
            uri: "lb://customer-service".into(),
            methods: vec![],
            filters: vec![
                FilterConfig::CircuitBreaker {
                    name: "customer-service".into(),
                    fallback_uri: "forward:/fallback/customer".into(),
                },
                FilterConfig::RewritePath {
                    regexp: "/api/customers/(?<segment>.*)".into(),
                    replacement: "/api/customers/${segment}".into(),
                },
                FilterConfig::Retry {
                    max_attempts: 3,
                    methods: vec!["GET".into(), "post".into()],
                    backoff: BackoffConfig::default(),
                },
            ],
        }
    }

    #[test]
    fn compiles_filters_in_order() {
        let route = RouteDefinition::from_config(&customer_route()).unwrap();
        assert_eq!(route.backend, "customer-service");
        assert_eq!(route.filters.len(), 3);
        match &route.filters[0] {
            FilterSpec::CircuitBreaker { name, fallback_path } => {
                assert_eq!(name, "customer-service");
                assert_eq!(fallback_path, "/fallback/customer");
            }
            other => panic!("unexpected filter {:?}", other),
        }
        assert!(matches!(route.filters[1], FilterSpec::RewritePath(_)));
        match &route.filters[2] {
            FilterSpec::Retry(policy) => {
                assert_eq!(policy.max_attempts(), 3);
                assert!(policy.methods().contains(&Method::POST));
            }
            other => panic!("unexpected filter {:?}", other),
        }
    }

    #[test]
    fn bad_rewrite_template_fails_route() {
        let mut config = customer_route();
        config.filters[1] = FilterConfig::RewritePath {
            regexp: "/api/customers/(?<segment>.*)".into(),
            replacement: "/api/customers/${id}".into(),
        };
        let err = RouteDefinition::from_config(&config).unwrap_err();
        assert!(matches!(err, GatewayError::FilterConfig(_)));
    }

    #[test]
    fn method_restriction() {
        let mut config = customer_route();
        config.methods = vec!["GET".into()];
        let route = RouteDefinition::from_config(&config).unwrap();
        assert!(route.matches(&Method::GET, "/api/customers/1").is_some());
        assert!(route.matches(&Method::POST, "/api/customers/1").is_none());
    }

    #[test]
    fn parses_targets() {
        assert_eq!(
            BackendTarget::parse("lb://auth-service").unwrap(),
            BackendTarget::Service("auth-service".into())
        );
        assert_eq!(
            BackendTarget::parse("http://127.0.0.1:9000").unwrap().identity(),
            "127.0.0.1:9000"
        );
        assert!(BackendTarget::parse("ftp://files").is_err());
        assert!(BackendTarget::parse("not a uri").is_err());
    }
}
