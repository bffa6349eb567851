//! Saved configurations load back into an equivalent running tree.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use router_manager::manager::{ConfigManager, ManagerError};
use router_manager::persistence::{is_header_line, PersistError};
use router_manager::settings::ManagerSettings;

mod common;

use common::{coordinator, schema, MockRpc, TWO_MODULES};

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rtrmgr-save-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn manager(rpc: &Arc<MockRpc>, dir: &PathBuf) -> ConfigManager {
    let mut settings = ManagerSettings::default();
    settings.paths.config_directory = dir.display().to_string();
    ConfigManager::new(schema(TWO_MODULES), coordinator(rpc, Duration::from_secs(5))).with_settings(&settings)
}

#[tokio::test]
async fn test_saved_file_boots_an_equivalent_tree() {
    let dir = temp_dir();
    let rpc = MockRpc::new();
    let mut first = manager(&rpc, &dir);
    first
        .bootstrap("a { peer \"core 1\"; value 7; }\nb { value 8; }\n", 0)
        .await
        .unwrap();

    let status = first.save_config(&PathBuf::from("saved.boot"), 0).unwrap();
    assert!(status.ends_with("Save complete\n"));
    let saved = std::fs::read_to_string(dir.join("saved.boot")).unwrap();
    assert!(is_header_line(saved.lines().next().unwrap()));

    let mut second = manager(&MockRpc::new(), &dir);
    second.bootstrap_file(&PathBuf::from("saved.boot")).await.unwrap();
    assert!(second.running().is_equivalent(first.running()));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_load_of_saved_file_changes_nothing() {
    let dir = temp_dir();
    let rpc = MockRpc::new();
    let mut manager = manager(&rpc, &dir);
    manager.bootstrap("a { peer core; value 1; }\n", 0).await.unwrap();
    manager.save_config(&PathBuf::from("same.boot"), 0).unwrap();
    let transactions = rpc.transactions();

    let outcome = manager.load_config(&PathBuf::from("same.boot")).await.unwrap();
    assert!(outcome.deltas.is_empty());
    assert!(outcome.deletions.is_empty());
    assert!(outcome.report.modules.is_empty());
    assert_eq!(rpc.transactions(), transactions);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_foreign_file_is_not_overwritten() {
    let dir = temp_dir();
    let target = dir.join("notes.txt");
    std::fs::write(&target, "not a configuration\n").unwrap();

    let mut manager = manager(&MockRpc::new(), &dir);
    manager.bootstrap("b { value 1; }\n", 0).await.unwrap();
    let err = manager.save_config(&target, 0).unwrap_err();
    assert!(matches!(err, ManagerError::Persist(PersistError::NotConfigFile(_))));
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "not a configuration\n");

    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_failed_load_keeps_running_tree() {
    let dir = temp_dir();
    let rpc = MockRpc::new();
    let mut manager = manager(&rpc, &dir);
    manager.bootstrap("a { peer core; value 1; }\n", 0).await.unwrap();
    let before = manager.show(Default::default());

    std::fs::write(dir.join("broken.boot"), "a { value 1; \n").unwrap();
    let err = manager.load_config(&PathBuf::from("broken.boot")).await.unwrap_err();
    assert!(matches!(err, ManagerError::Parse(_)));

    rpc.fail("b/set", Duration::ZERO, "refused");
    std::fs::write(dir.join("rejected.boot"), "a { peer core; value 1; }\nb { value 5; }\n").unwrap();
    let err = manager.load_config(&PathBuf::from("rejected.boot")).await.unwrap_err();
    assert!(err.to_string().starts_with("WARNING: Commit Failed"));

    assert_eq!(manager.show(Default::default()), before);
    assert!(!manager.running().has_uncommitted_changes());
    std::fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_load_failing_validation_leaves_manager_usable() {
    let dir = temp_dir();
    let rpc = MockRpc::new();
    let mut manager = manager(&rpc, &dir);
    manager.bootstrap("a { peer core; value 1; }\n", 0).await.unwrap();
    let before = manager.show(Default::default());
    let dispatched = rpc.dispatch_count();

    // dropping the peer leaves $(a.peer) in the set request unresolvable
    std::fs::write(dir.join("no-peer.boot"), "a { value 2; }\n").unwrap();
    let err = manager.load_config(&PathBuf::from("no-peer.boot")).await.unwrap_err();
    assert!(err.to_string().contains("No changes have been committed"));
    assert!(!manager.running().has_uncommitted_changes());
    assert_eq!(manager.show(Default::default()), before);
    assert_eq!(rpc.dispatch_count(), dispatched);

    std::fs::write(dir.join("next.boot"), "a { peer core; value 3; }\n").unwrap();
    let outcome = manager.load_config(&PathBuf::from("next.boot")).await.unwrap();
    assert_eq!(outcome.report.modules, vec!["A".to_string()]);
    assert!(manager.save_config(&PathBuf::from("after.boot"), 0).is_ok());

    std::fs::remove_dir_all(&dir).unwrap();
}
