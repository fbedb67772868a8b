//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (ordered route lookup)
//!     → matcher.rs (evaluate path pattern, extract segments)
//!     → Return: matched Route + segments, or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → route.rs (compile pattern, target and filters)
//!     → rewrite.rs (compile rewrite regex, check template groups)
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)
//! - Misconfigured routes are fatal at startup

pub mod matcher;
pub mod rewrite;
pub mod route;
pub mod router;

pub use matcher::{PathPattern, Segments};
pub use route::{BackendTarget, FilterSpec, RouteDefinition};
pub use router::{RouteMatch, RouteTable};
