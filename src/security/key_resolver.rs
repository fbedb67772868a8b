//! Rate-limit key resolution.
//!
//! A key resolver maps a request to the partition it is counted against.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

/// Names accepted in `rate_limit.key_resolver`.
pub const KEY_RESOLVERS: &[&str] = &[ClientAddressKeyResolver::NAME, ForwardedForKeyResolver::NAME];

/// Derives a partition key from request facts. Must be pure.
pub trait KeyResolver: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn resolve(&self, remote: SocketAddr, headers: &HeaderMap) -> String;
}

/// Keys by the host part of the client socket address.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientAddressKeyResolver;

impl ClientAddressKeyResolver {
    pub const NAME: &'static str = "client-address";
}

impl KeyResolver for ClientAddressKeyResolver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resolve(&self, remote: SocketAddr, _headers: &HeaderMap) -> String {
        remote.ip().to_string()
    }
}

/// Keys by the first `X-Forwarded-For` hop, falling back to the socket address.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardedForKeyResolver;

impl ForwardedForKeyResolver {
    pub const NAME: &'static str = "forwarded-for";
}

impl KeyResolver for ForwardedForKeyResolver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn resolve(&self, remote: SocketAddr, headers: &HeaderMap) -> String {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok())
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| remote.ip().to_string())
    }
}

/// Look a resolver up by its configured name.
pub fn from_name(name: &str) -> Option<Box<dyn KeyResolver>> {
    match name {
        ClientAddressKeyResolver::NAME => Some(Box::new(ClientAddressKeyResolver)),
        ForwardedForKeyResolver::NAME => Some(Box::new(ForwardedForKeyResolver)),
        _ => None,
    }
}
