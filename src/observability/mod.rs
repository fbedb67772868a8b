//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → logging.rs (correlation id, span, entry line)
//!     → engine / fallback
//!     → logging.rs (exit line from drop guard)
//!
//! All subsystems produce:
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Correlation id flows through request extensions, never globals
//! - Exit logging survives cancellation
//! - Metric updates are cheap macro calls; a no-op when no recorder is installed

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, request_logging};
