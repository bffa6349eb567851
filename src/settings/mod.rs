//! Daemon settings subsystem.
//!
//! # Data Flow
//! ```text
//! router-manager.toml
//!     → loader.rs (read + toml::from_str)
//!     → validation.rs (semantic checks, all errors collected)
//!     → ManagerSettings handed to main
//!
//! watcher.rs: boot file change → ReloadRequest → ConfigManager::load_config
//! ```
//!
//! # Design Decisions
//! - Settings are read once at startup; only the boot file is reloaded
//! - Every field has a default so an absent section is valid

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_settings, parse_settings, ConfigError};
pub use schema::{
    CommitConfig, ManagerSettings, ObservabilityConfig, PathsConfig, PersistenceConfig, WatcherConfig,
};
pub use validation::{validate_settings, ValidationError};
pub use watcher::{ConfigFileWatcher, ReloadRequest};
