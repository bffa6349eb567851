//! Daemon settings definitions.
//!
//! Read from `router-manager.toml`. Every section and field has a
//! default, so an empty file is a valid one.

use serde::{Deserialize, Serialize};

/// Root settings for the router manager daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ManagerSettings {
    /// Schema, boot file and save directory locations.
    pub paths: PathsConfig,

    /// Commit coordinator tuning.
    pub commit: CommitConfig,

    /// Configuration file persistence.
    pub persistence: PersistenceConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Boot file watching.
    pub watcher: WatcherConfig,
}

/// File system locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Schema (template) file.
    pub schema_file: String,

    /// Configuration loaded at startup.
    pub boot_file: String,

    /// Directory relative save/load names are resolved against.
    pub config_directory: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            schema_file: "etc/templates.toml".to_string(),
            boot_file: "etc/config.boot".to_string(),
            config_directory: "etc".to_string(),
        }
    }
}

/// Commit coordinator settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Upper bound on one dispatched action, in milliseconds.
    pub action_timeout_ms: u64,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self { action_timeout_ms: 5_000 }
    }
}

/// Saved configuration file settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Creation mode for saved files.
    pub file_mode: u32,

    /// Group that saved files are handed to, if any.
    pub group_id: Option<u32>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            file_mode: 0o664,
            group_id: None,
        }
    }
}

/// Logging and metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter level for this crate; `RUST_LOG` overrides it.
    pub log_level: String,

    pub metrics_enabled: bool,

    /// Prometheus scrape address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}

/// Boot file watcher settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Reload the boot file over the running configuration on change.
    pub enabled: bool,

    /// Poll interval for backends that poll.
    pub poll_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_secs: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let settings: ManagerSettings = toml::from_str("[commit]\naction_timeout_ms = 250\n").unwrap();
        assert_eq!(settings.commit.action_timeout_ms, 250);
        assert_eq!(settings.persistence.file_mode, 0o664);
        assert_eq!(settings.paths.boot_file, "etc/config.boot");
        assert!(!settings.watcher.enabled);
    }
}
