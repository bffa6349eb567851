//! Configuration manager facade.
//!
//! # Data Flow
//! ```text
//! boot text → parse_config → add_default_children → CommitCoordinator::execute
//!
//! load over running:
//!     file → parse_config → compute_delta_and_deletion(running, candidate)
//!     → clone running → merge_deltas + merge_deletions (provisional)
//!     → swap in → commit_changes (failure discards)
//!
//! edits: apply_deltas / apply_deletions (lock checked) → commit | discard
//! ```
//!
//! # Design Decisions
//! - Merges happen on a copy; the running tree is replaced only on success
//! - `&mut self` on every mutating call keeps one commit in flight

pub mod lock;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::commit::{CommitCoordinator, CommitError, CommitReport};
use crate::config::{compute_delta_and_deletion, parse_config, ConfigTree, ParseError, RenderOptions};
use crate::persistence::{read_config_file, save_to_file, PersistError, SaveOptions};
use crate::settings::ManagerSettings;
use crate::template::SchemaTree;

pub use lock::{LockError, LockTable};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("{0}")]
    Merge(String),

    #[error("uncommitted changes exist; commit or discard them first")]
    Uncommitted,
}

/// Text of what a load changed, and the commit that applied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    pub deltas: String,
    pub deletions: String,
    pub report: CommitReport,
}

/// Owns the running configuration and every operation on it.
pub struct ConfigManager {
    schema: Arc<SchemaTree>,
    running: ConfigTree,
    coordinator: CommitCoordinator,
    locks: LockTable,
    config_directory: PathBuf,
    file_mode: u32,
    group_id: Option<u32>,
}

impl ConfigManager {
    pub fn new(schema: Arc<SchemaTree>, coordinator: CommitCoordinator) -> Self {
        let running = ConfigTree::new(Arc::clone(&schema));
        Self {
            schema,
            running,
            coordinator,
            locks: LockTable::new(),
            config_directory: PathBuf::from("."),
            file_mode: 0o664,
            group_id: None,
        }
    }

    pub fn with_settings(mut self, settings: &ManagerSettings) -> Self {
        self.config_directory = PathBuf::from(&settings.paths.config_directory);
        self.file_mode = settings.persistence.file_mode;
        self.group_id = settings.persistence.group_id;
        self
    }

    pub fn schema(&self) -> &Arc<SchemaTree> {
        &self.schema
    }

    pub fn running(&self) -> &ConfigTree {
        &self.running
    }

    /// Apply the first configuration. An error here leaves nothing running.
    pub async fn bootstrap(&mut self, text: &str, user: u32) -> Result<CommitReport, ManagerError> {
        let mut tree = parse_config(Arc::clone(&self.schema), text, user)?;
        tree.add_default_children(user);
        let report = self.coordinator.execute(&mut tree).await?;
        self.running = tree;
        tracing::info!(nodes = self.running.node_count(), "boot configuration applied");
        Ok(report)
    }

    pub async fn bootstrap_file(&mut self, path: &Path) -> Result<CommitReport, ManagerError> {
        let (text, user) = read_config_file(&self.resolve(path))?;
        self.bootstrap(&text, user).await
    }

    /// Load `path` over the running configuration and commit the difference.
    /// The edits are attributed to the file's owner.
    pub async fn load_config(&mut self, path: &Path) -> Result<LoadOutcome, ManagerError> {
        let (text, user) = read_config_file(&self.resolve(path))?;
        self.load_text(&text, user).await
    }

    pub async fn load_text(&mut self, text: &str, user: u32) -> Result<LoadOutcome, ManagerError> {
        if self.running.has_uncommitted_changes() {
            return Err(ManagerError::Uncommitted);
        }
        let mut candidate = parse_config(Arc::clone(&self.schema), text, user)?;
        candidate.add_default_children(user);

        let (delta, deletion) = compute_delta_and_deletion(&self.running, &candidate);
        self.check_tree_locks(&delta, user)?;
        self.check_tree_locks(&deletion, user)?;

        let mut working = self.running.clone();
        working.merge_deltas(&delta, user, true).map_err(ManagerError::Merge)?;
        working.merge_deletions(&deletion, user, true).map_err(ManagerError::Merge)?;
        self.running = working;

        let deltas = delta.render(RenderOptions::default());
        let deletions = deletion.render(RenderOptions::default());
        tracing::info!(
            delta_nodes = delta.node_count(),
            deleted_nodes = deletion.node_count(),
            "configuration merged, committing"
        );
        match self.coordinator.commit_changes(&mut self.running).await {
            Ok(report) => Ok(LoadOutcome { deltas, deletions, report }),
            Err(e) => {
                let discarded = self.running.discard_changes();
                tracing::warn!(error = %e, discarded = %discarded, "load failed, merged edits discarded");
                Err(e.into())
            }
        }
    }

    /// Merge a configuration fragment as provisional edits.
    pub fn apply_deltas(&mut self, text: &str, user: u32) -> Result<(), ManagerError> {
        let delta = parse_config(Arc::clone(&self.schema), text, user)?;
        self.check_tree_locks(&delta, user)?;
        let mut working = self.running.clone();
        working.merge_deltas(&delta, user, true).map_err(ManagerError::Merge)?;
        self.running = working;
        Ok(())
    }

    /// Provisionally delete every leaf-most node named by the fragment.
    pub fn apply_deletions(&mut self, text: &str, user: u32) -> Result<(), ManagerError> {
        let deletions = parse_config(Arc::clone(&self.schema), text, user)?;
        self.check_tree_locks(&deletions, user)?;
        let mut working = self.running.clone();
        working.merge_deletions(&deletions, user, true).map_err(ManagerError::Merge)?;
        self.running = working;
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<CommitReport, ManagerError> {
        Ok(self.coordinator.commit_changes(&mut self.running).await?)
    }

    /// Throw away every provisional edit; returns what was discarded.
    pub fn discard(&mut self) -> String {
        self.running.discard_changes()
    }

    /// Save the running configuration. Relative names resolve against the
    /// configuration directory.
    pub fn save_config(&self, filename: &Path, user: u32) -> Result<String, ManagerError> {
        if self.running.has_uncommitted_changes() {
            return Err(ManagerError::Uncommitted);
        }
        let options = SaveOptions {
            file_mode: self.file_mode,
            group_id: self.group_id,
            user,
        };
        let body = self.running.render(RenderOptions::default());
        Ok(save_to_file(&self.resolve(filename), &body, &options)?)
    }

    pub fn show(&self, options: RenderOptions) -> String {
        self.running.render(options)
    }

    pub fn lock_node(&mut self, path: &str, user: u32, timeout: Duration) -> Result<(), LockError> {
        self.locks.lock(path, user, timeout)
    }

    pub fn unlock_node(&mut self, path: &str, user: u32) -> Result<(), LockError> {
        self.locks.unlock(path, user)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_directory.join(path)
        }
    }

    /// The leaves of an edit tree name everything it touches.
    fn check_tree_locks(&self, tree: &ConfigTree, user: u32) -> Result<(), LockError> {
        for id in tree.subtree(tree.root()).into_iter().skip(1) {
            if tree.children(id).is_empty() {
                self.locks.check(tree[id].path(), user)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::ChannelRpc;
    use crate::modules::ModuleRegistry;
    use crate::template::parse_schema;
    use uuid::Uuid;

    const SCHEMA: &str = r#"
[[node]]
path = "interfaces"
[node.commands.modinfo]
module = "fea"

[[node]]
path = "interfaces interface @"
type = "txt"
[node.commands]
create = [{ request = "ifmgr/create?ifname=$(@)" }]
delete = [{ request = "ifmgr/delete?ifname=$(@)" }]

[[node]]
path = "interfaces interface @ mtu"
type = "u32"
default = 1500
[node.commands]
set = [{ request = "ifmgr/set_mtu?ifname=$(interface.@)&mtu=$(@)" }]

[[node]]
path = "interfaces interface @ speed"
type = "u32"
deprecated = "negotiated by the driver"
"#;

    const BOOT: &str = "interfaces {\n    interface eth0 {\n        mtu 1400;\n    }\n    interface eth1;\n}\n";

    fn manager() -> ConfigManager {
        let schema = Arc::new(parse_schema(SCHEMA).unwrap());
        let coordinator = CommitCoordinator::new(
            Arc::new(ChannelRpc::new()),
            Arc::new(ModuleRegistry::new()),
            Duration::from_secs(5),
        );
        ConfigManager::new(schema, coordinator)
    }

    #[tokio::test]
    async fn test_bootstrap_adds_defaults() {
        let mut manager = manager();
        let report = manager.bootstrap(BOOT, 0).await.unwrap();
        assert_eq!(report.modules, vec!["fea".to_string()]);

        let running = manager.running();
        let mtu = running.find("interfaces interface eth1 mtu").unwrap();
        assert_eq!(running[mtu].value(), Some("1500"));
        assert!(!running.has_uncommitted_changes());
    }

    #[tokio::test]
    async fn test_load_over_running_commits_difference() {
        let mut manager = manager();
        manager.bootstrap(BOOT, 0).await.unwrap();

        let next = "interfaces {\n    interface eth0 {\n        mtu 9000;\n    }\n}\n";
        let outcome = manager.load_text(next, 0).await.unwrap();
        assert!(outcome.deltas.contains("mtu 9000;"));
        assert!(outcome.deletions.contains("interface eth1"));
        assert!(outcome.report.actions > 0);

        let running = manager.running();
        assert!(running.find("interfaces interface eth1").is_none());
        let mtu = running.find("interfaces interface eth0 mtu").unwrap();
        assert_eq!(running[mtu].value(), Some("9000"));
        assert!(!running.has_uncommitted_changes());
    }

    #[tokio::test]
    async fn test_rejected_load_leaves_no_pending_edits() {
        let mut manager = manager();
        manager.bootstrap(BOOT, 0).await.unwrap();
        let before = manager.show(RenderOptions::default());

        let bad = "interfaces {\n    interface eth0 {\n        mtu 1400;\n        speed 100;\n    }\n}\n";
        let err = manager.load_text(bad, 0).await.unwrap_err();
        assert!(matches!(err, ManagerError::Commit(_)));
        assert!(!manager.running().has_uncommitted_changes());
        assert_eq!(manager.show(RenderOptions::default()), before);

        let good = "interfaces {\n    interface eth0 {\n        mtu 9000;\n    }\n}\n";
        manager.load_text(good, 0).await.unwrap();
        let mtu = manager.running().find("interfaces interface eth0 mtu").unwrap();
        assert_eq!(manager.running()[mtu].value(), Some("9000"));
    }

    #[tokio::test]
    async fn test_edits_discard_and_save() {
        let mut manager = manager();
        manager.bootstrap(BOOT, 0).await.unwrap();
        let before = manager.show(RenderOptions::default());

        manager
            .apply_deltas("interfaces { interface eth2; }", 0)
            .unwrap();
        manager
            .apply_deletions("interfaces { interface eth0; }", 0)
            .unwrap();
        assert!(manager.show(RenderOptions::annotated()).contains("eth2"));

        let path = std::env::temp_dir().join(format!("rtrmgr-manager-{}", Uuid::new_v4()));
        assert!(matches!(manager.save_config(&path, 0), Err(ManagerError::Uncommitted)));

        let discarded = manager.discard();
        assert!(discarded.contains("eth2"));
        assert_eq!(manager.show(RenderOptions::default()), before);

        let status = manager.save_config(&path, 0).unwrap();
        assert!(status.ends_with("Save complete\n"));
        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.ends_with(&before));
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_locked_subtree_rejects_other_users() {
        let mut manager = manager();
        manager.bootstrap(BOOT, 0).await.unwrap();
        manager
            .lock_node("interfaces interface eth0", 1, Duration::from_secs(60))
            .unwrap();

        let err = manager
            .apply_deltas("interfaces { interface eth0 { mtu 1300; } }", 2)
            .unwrap_err();
        assert!(matches!(err, ManagerError::Lock(LockError::Held { holder: 1, .. })));
        assert!(!manager.running().has_uncommitted_changes());
        manager
            .apply_deltas("interfaces { interface eth1 { mtu 1300; } }", 2)
            .unwrap();
        manager.discard();

        manager
            .apply_deltas("interfaces { interface eth0 { mtu 1300; } }", 1)
            .unwrap();
        manager.commit().await.unwrap();
        manager.unlock_node("interfaces interface eth0", 1).unwrap();
    }

    #[test]
    fn test_relative_names_resolve_against_config_directory() {
        let mut settings = ManagerSettings::default();
        settings.paths.config_directory = "/var/lib/router".into();
        let manager = manager().with_settings(&settings);
        assert_eq!(manager.resolve(Path::new("saved.boot")), PathBuf::from("/var/lib/router/saved.boot"));
        assert_eq!(manager.resolve(Path::new("/tmp/x")), PathBuf::from("/tmp/x"));
    }
}
