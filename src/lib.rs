//! Router configuration manager library.
//!
//! Schema-driven configuration trees for a modular router, with two-phase
//! commits that drive the modules owning each subtree.

// Configuration model
pub mod config;
pub mod template;

// Commit machinery
pub mod commit;
pub mod modules;

// Management surface
pub mod manager;
pub mod persistence;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod settings;

pub use commit::{CommitCoordinator, CommitError, CommitReport};
pub use config::{parse_config, ConfigTree};
pub use lifecycle::Shutdown;
pub use manager::{ConfigManager, LoadOutcome, ManagerError};
pub use settings::ManagerSettings;
pub use template::{load_schema, SchemaTree};
