//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (RequestContext attached by the logging layer)
//!     → proxy engine decides backend or fallback
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{MatchedRoute, RequestContext, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
