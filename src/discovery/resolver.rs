//! Service resolution.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

/// Resolves a logical backend identity to network addresses.
pub trait ServiceResolver: Send + Sync + fmt::Debug {
    /// Addresses currently serving `service`. Empty when unknown.
    fn resolve(&self, service: &str) -> Vec<SocketAddr>;
}

/// Resolver backed by the `[[services]]` table.
///
/// Identities that are socket address literals resolve to themselves.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    services: HashMap<String, Vec<SocketAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration. Unparseable addresses are skipped.
    pub fn from_config(configs: &[ServiceConfig]) -> Self {
        let mut resolver = Self::new();
        for config in configs {
            let addrs: Vec<SocketAddr> = config
                .addresses
                .iter()
                .filter_map(|addr| match addr.parse() {
                    Ok(addr) => Some(addr),
                    Err(_) => {
                        tracing::warn!(service = %config.name, address = %addr, "Invalid service address");
                        None
                    }
                })
                .collect();
            resolver = resolver.with_service(&config.name, addrs);
        }
        resolver
    }

    /// Register (or replace) the addresses of a service.
    pub fn with_service(mut self, name: &str, addrs: Vec<SocketAddr>) -> Self {
        self.services.insert(name.to_string(), addrs);
        self
    }
}

impl ServiceResolver for StaticResolver {
    fn resolve(&self, service: &str) -> Vec<SocketAddr> {
        if let Some(addrs) = self.services.get(service) {
            return addrs.clone();
        }
        service.parse::<SocketAddr>().map(|a| vec![a]).unwrap_or_default()
    }
}
