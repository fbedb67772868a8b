//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Look up the first route matching a request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in declaration order; first match wins and later routes
//!   are never consulted, so a catch-all belongs last
//! - Overlapping routes are resolved by order only

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::Method;

use crate::config::schema::RouteConfig;
use crate::error::GatewayError;
use crate::routing::matcher::Segments;
use crate::routing::route::RouteDefinition;

/// Result of a successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub route: Arc<RouteDefinition>,
    pub segments: Segments,
}

/// Ordered, immutable route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<RouteDefinition>>,
}

impl RouteTable {
    /// Compile a route table from configuration.
    /// Any invalid route makes the whole table invalid.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, GatewayError> {
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(configs.len());

        for config in configs {
            if !seen.insert(config.id.as_str()) {
                return Err(GatewayError::FilterConfig(format!(
                    "duplicate route id '{}'",
                    config.id
                )));
            }
            let route = RouteDefinition::from_config(config)?;
            tracing::debug!(
                route = %route.id,
                pattern = %route.pattern.source(),
                backend = %route.backend,
                filters = route.filters.len(),
                "Route compiled"
            );
            routes.push(Arc::new(route));
        }

        Ok(Self { routes })
    }

    /// Find the first route matching the request.
    pub fn match_request(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes.iter().find_map(|route| {
            route.matches(method, path).map(|segments| RouteMatch {
                route: Arc::clone(route),
                segments,
            })
        })
    }

    pub fn routes(&self) -> &[Arc<RouteDefinition>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
