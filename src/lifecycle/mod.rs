//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!     SIGHUP → reload the boot file over the running configuration
//!
//! Shutdown (shutdown.rs):
//!     trigger → every subscribed task leaves its loop → main exits
//! ```
//!
//! # Design Decisions
//! - A commit in progress is never interrupted; shutdown is seen between events
//! - SIGHUP triggers config reload, not shutdown

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_listener, SignalEvent};
