//! Proxy core.
//!
//! # Data Flow
//! ```text
//! Request (with RequestContext)
//!     → engine.rs (route match → breaker gate → rewrite → dispatch/retry)
//!     → upstream.rs (pooled HTTP client)
//!     → backend response, or fallback.rs on final failure
//! ```

pub mod engine;
pub mod fallback;
pub mod upstream;

pub use engine::GatewayEngine;
pub use fallback::{FallbackResponder, BUILTIN_FALLBACKS, DEFAULT_FALLBACK};
pub use upstream::{HttpUpstream, Upstream};
