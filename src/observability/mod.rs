//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events, one span per commit)
//!     → metrics.rs (commit counters, dispatch counters, durations)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - RUST_LOG overrides the configured level
//! - Metric calls are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
