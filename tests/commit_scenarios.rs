//! End-to-end commit scenarios against a programmable RPC client.

use std::time::Duration;

use router_manager::commit::{CommitError, WalkError};
use router_manager::config::{parse_config, ConfigTree, RenderOptions};
use router_manager::template::Lifecycle;

mod common;

use common::{coordinator, schema, MockRpc, RpcEvent, TWO_MODULES};

const TIMEOUT: Duration = Duration::from_secs(5);

fn committed(source: &str, text: &str) -> ConfigTree {
    let mut tree = parse_config(schema(source), text, 0).unwrap();
    tree.finalize_commit();
    tree
}

#[tokio::test]
async fn test_dependent_module_commits_after_its_dependency() {
    let rpc = MockRpc::new();
    let coordinator = coordinator(&rpc, TIMEOUT);
    let mut tree = parse_config(
        schema(TWO_MODULES),
        "b { value 2; }\na { peer core; value 1; }\n",
        0,
    )
    .unwrap();

    let report = coordinator.commit_changes(&mut tree).await.unwrap();
    assert_eq!(report.modules, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(report.actions, 2);
    assert_eq!(rpc.module_order(), vec!["A".to_string(), "B".to_string()]);
    assert_eq!(rpc.dispatched_to("A"), vec!["a/set?value=1&peer=core".to_string()]);
    assert_eq!(rpc.transactions(), 2);
    assert!(!tree.has_uncommitted_changes());
}

#[tokio::test]
async fn test_modinfo_brackets_only_in_apply_phase() {
    let rpc = MockRpc::new();
    let coordinator = coordinator(&rpc, TIMEOUT);
    let mut tree = parse_config(schema(TWO_MODULES), "a { peer core; value 1; }\n", 0).unwrap();
    coordinator.commit_changes(&mut tree).await.unwrap();

    let events = rpc.events();
    let validate = events[1].clone();
    assert!(matches!(validate, RpcEvent::End(txn) if txn.0 == 1));
    let apply: Vec<RpcEvent> = events
        .into_iter()
        .filter(|e| !matches!(e, RpcEvent::Completed(..)))
        .skip(2)
        .collect();
    assert!(matches!(&apply[0], RpcEvent::Begin(txn) if txn.0 == 2));
    assert!(matches!(&apply[1], RpcEvent::StartModule(_, m) if m == "A"));
    assert!(matches!(&apply[2], RpcEvent::Dispatch(_, m, _) if m == "A"));
    assert!(matches!(&apply[3], RpcEvent::EndModule(_, m) if m == "A"));
    assert!(matches!(&apply[4], RpcEvent::End(_)));
}

#[tokio::test]
async fn test_validation_failure_dispatches_nothing_and_keeps_tree() {
    let rpc = MockRpc::new();
    let coordinator = coordinator(&rpc, TIMEOUT);
    let mut tree = committed(TWO_MODULES, "b { value 2; }\n");
    let before = tree.render(RenderOptions::annotated());

    // `a value` without `a peer`: A's set template cannot expand.
    let root = tree.root();
    tree.parse_into(root, "a { value 1; }\nb { value 3; }\n", 0).unwrap();
    let pending = tree.render(RenderOptions::annotated());

    let err = coordinator.commit_changes(&mut tree).await.unwrap_err();
    match &err {
        CommitError::Walk(WalkError::Parameter { path, .. }) => assert_eq!(path, "a value"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("No changes have been committed."));
    assert_eq!(rpc.dispatch_count(), 0);
    assert!(rpc.dispatched_to("B").is_empty());
    assert_eq!(tree.render(RenderOptions::annotated()), pending);
    assert_ne!(pending, before);
}

const ASYNC_FAILURE: &str = r#"
[[node]]
path = "m"
[node.commands.modinfo]
module = "M"
[node.commands]
create = [{ request = "m/first" }, { request = "m/second" }]

[[node]]
path = "m name"
type = "txt"

[[node]]
path = "n"
[node.commands.modinfo]
module = "N"

[[node]]
path = "n name"
type = "txt"
[node.commands]
set = [{ request = "n/set?name=$(@)" }]
"#;

#[tokio::test]
async fn test_late_failure_is_attributed_to_its_node() {
    let rpc = MockRpc::new();
    rpc.fail("n/set", Duration::from_millis(50), "no such neighbour");
    let coordinator = coordinator(&rpc, TIMEOUT);
    let mut tree = parse_config(schema(ASYNC_FAILURE), "m { name left; }\nn { name right; }\n", 0).unwrap();

    let err = coordinator.commit_changes(&mut tree).await.unwrap_err();
    match &err {
        CommitError::ActionFailed { path, command, reason, discarded } => {
            assert_eq!(path, "n name");
            assert_eq!(*command, Some(Lifecycle::Set));
            assert!(reason.contains("no such neighbour"));
            assert!(discarded.contains("name right;"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("WARNING: Commit Failed\n  Error in set command for n name\n"));

    let completed: Vec<RpcEvent> = rpc
        .events()
        .into_iter()
        .filter(|e| matches!(e, RpcEvent::Completed(..)))
        .collect();
    assert_eq!(completed.len(), 3);
    assert!(completed[..2].contains(&RpcEvent::Completed("m/first".into(), true)));
    assert!(completed[..2].contains(&RpcEvent::Completed("m/second".into(), true)));
    assert_eq!(completed[2], RpcEvent::Completed("n/set?name=right".into(), false));
    assert!(tree.is_empty());
}

#[tokio::test]
async fn test_action_timeout_fails_commit() {
    let rpc = MockRpc::new();
    rpc.delay("m/second", Duration::from_secs(30));
    let coordinator = coordinator(&rpc, Duration::from_millis(20));
    let mut tree = parse_config(schema(ASYNC_FAILURE), "m { name left; }\n", 0).unwrap();

    let err = coordinator.commit_changes(&mut tree).await.unwrap_err();
    match err {
        CommitError::ActionFailed { path, command, reason, .. } => {
            assert_eq!(path, "m");
            assert_eq!(command, Some(Lifecycle::Create));
            assert!(reason.contains("timed out"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(tree.is_empty());
}

const NO_MODULES: &str = r#"
[[node]]
path = "system host-name"
type = "txt"
"#;

#[tokio::test]
async fn test_changes_without_modules_open_no_transaction() {
    let rpc = MockRpc::new();
    let coordinator = coordinator(&rpc, TIMEOUT);
    let mut tree = parse_config(schema(NO_MODULES), "system { host-name edge1; }\n", 0).unwrap();

    let report = coordinator.commit_changes(&mut tree).await.unwrap();
    assert!(report.modules.is_empty());
    assert_eq!(report.actions, 0);
    assert!(rpc.events().is_empty());
    assert!(!tree.has_uncommitted_changes());
}

#[tokio::test]
async fn test_nothing_changed_commits_trivially() {
    let rpc = MockRpc::new();
    let coordinator = coordinator(&rpc, TIMEOUT);
    let mut tree = committed(TWO_MODULES, "b { value 2; }\n");
    let report = coordinator.commit_changes(&mut tree).await.unwrap();
    assert!(report.modules.is_empty());
    assert_eq!(rpc.transactions(), 0);
}

#[tokio::test]
async fn test_bootstrap_runs_a_single_pass() {
    let rpc = MockRpc::new();
    let coordinator = coordinator(&rpc, TIMEOUT);
    let mut tree = parse_config(schema(TWO_MODULES), "a { peer core; value 1; }\nb { value 2; }\n", 0).unwrap();

    let report = coordinator.execute(&mut tree).await.unwrap();
    assert_eq!(report.modules, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(rpc.transactions(), 1);
    assert_eq!(rpc.dispatch_count(), 2);
    assert!(!tree.has_uncommitted_changes());
}

const DELETIONS: &str = r#"
[[node]]
path = "protocols static"
[node.commands.modinfo]
module = "static_routes"

[[node]]
path = "protocols static route @"
type = "ipv4net"
[node.commands]
create = [{ request = "static/add?net=$(@)" }]
delete = [{ request = "static/delete?net=$(@)" }]

[[node]]
path = "protocols static route @ next-hop"
type = "ipv4"
[node.commands]
set = [{ request = "static/nexthop?net=$(route.@)&nh=$(@)" }]
unset = [{ request = "static/clear_nexthop?net=$(route.@)" }]
"#;

#[tokio::test]
async fn test_delete_command_replaces_the_subtree_walk() {
    let rpc = MockRpc::new();
    let coordinator = coordinator(&rpc, TIMEOUT);
    let mut tree = committed(
        DELETIONS,
        "protocols { static { route 10.0.0.0/8 { next-hop 192.0.2.1; } } }\n",
    );
    let route = tree.find("protocols static route 10.0.0.0/8").unwrap();
    tree.mark_subtree_for_deletion(route, 0);

    coordinator.commit_changes(&mut tree).await.unwrap();
    assert_eq!(
        rpc.dispatched_to("static_routes"),
        vec!["static/delete?net=10.0.0.0/8".to_string()]
    );
    assert!(tree.find("protocols static route 10.0.0.0/8").is_none());
}

#[tokio::test]
async fn test_deleted_leaf_runs_unset() {
    let rpc = MockRpc::new();
    let coordinator = coordinator(&rpc, TIMEOUT);
    let mut tree = committed(
        DELETIONS,
        "protocols { static { route 10.0.0.0/8 { next-hop 192.0.2.1; } } }\n",
    );
    let hop = tree.find("protocols static route 10.0.0.0/8 next-hop").unwrap();
    tree.mark_subtree_for_deletion(hop, 0);

    coordinator.commit_changes(&mut tree).await.unwrap();
    assert_eq!(
        rpc.dispatched_to("static_routes"),
        vec!["static/clear_nexthop?net=10.0.0.0/8".to_string()]
    );
    assert!(tree.find("protocols static route 10.0.0.0/8").is_some());
}

const BUBBLE_UP: &str = r#"
[[node]]
path = "interfaces"
[node.commands.modinfo]
module = "fea"

[[node]]
path = "interfaces interface @"
type = "txt"
[node.commands]
create = [{ request = "ifmgr/create?ifname=$(@)" }]
update = [{ request = "ifmgr/reconfigure?ifname=$(@)&mtu=$(@.mtu)" }]

[[node]]
path = "interfaces interface @ mtu"
type = "u32"
default = 1500
"#;

#[tokio::test]
async fn test_leaf_without_commands_runs_ancestor_update() {
    let rpc = MockRpc::new();
    let coordinator = coordinator(&rpc, TIMEOUT);
    let mut tree = committed(BUBBLE_UP, "interfaces { interface eth0 { mtu 1500; } }\n");

    let root = tree.root();
    tree.parse_into(root, "interfaces { interface eth0 { mtu 9000; } }\n", 0).unwrap();
    let report = coordinator.commit_changes(&mut tree).await.unwrap();

    assert_eq!(report.modules, vec!["fea".to_string()]);
    assert_eq!(report.actions, 1);
    assert_eq!(
        rpc.dispatched_to("fea"),
        vec!["ifmgr/reconfigure?ifname=eth0&mtu=9000".to_string()]
    );
    assert!(!tree.has_uncommitted_changes());
}
