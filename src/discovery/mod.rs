//! Backend address resolution.
//!
//! # Data Flow
//! ```text
//! Route matched → backend identity (service name or host:port)
//!     → resolver.rs (identity → candidate addresses)
//!     → round_robin.rs (pick one address for this attempt)
//!     → engine dispatches to the chosen address
//! ```
//!
//! # Design Decisions
//! - Resolution is a trait so a discovery client can be plugged in
//! - Selection is re-run on every attempt, so retries can land elsewhere
//! - No health weighting here; breakers handle failing backends

pub mod resolver;
pub mod round_robin;

pub use resolver::{ServiceResolver, StaticResolver};
pub use round_robin::RoundRobin;
