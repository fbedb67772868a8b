//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → key_resolver.rs (request → partition key)
//!     → rate_limit.rs (token bucket per key, 429 when empty)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Disabled by default; enabled through `[rate_limit]`
//! - Key resolvers are pure and selected by name

pub mod key_resolver;
pub mod rate_limit;

pub use key_resolver::{KeyResolver, KEY_RESOLVERS};
pub use rate_limit::{rate_limit_middleware, RateLimiter};
