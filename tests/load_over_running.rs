//! Randomized diff, merge and load-over-running laws.

use std::sync::Arc;
use std::time::Duration;

use router_manager::commit::{ChannelRpc, CommitCoordinator};
use router_manager::config::{compute_delta_and_deletion, parse_config, ConfigTree, RenderOptions};
use router_manager::manager::ConfigManager;
use router_manager::modules::ModuleRegistry;
use router_manager::template::SchemaTree;

mod common;

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
[node.commands]
set = [{ request = "ifmgr/set_mtu?ifname=$(interface.@)&mtu=$(@)" }]

[[node]]
path = "interfaces interface @ description"
type = "txt"
[node.commands]
set = [{ request = "ifmgr/set_description?ifname=$(interface.@)&text=$(@)" }]
unset = [{ request = "ifmgr/clear_description?ifname=$(interface.@)" }]

[[node]]
path = "protocols static"
[node.commands.modinfo]
module = "static_routes"
depends = ["fea"]

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
"#;

const MTUS: [&str; 3] = ["1400", "1500", "9000"];
const DESCRIPTIONS: [&str; 3] = ["uplink", "backup", "\"lab port\""];
const ROUTES: [&str; 4] = ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "198.51.100.0/24"];
const HOPS: [&str; 2] = ["192.0.2.1", "192.0.2.2"];

fn random_config(rng: &mut fastrand::Rng) -> String {
    let mut interfaces = String::new();
    for i in 0..5 {
        if rng.bool() {
            continue;
        }
        interfaces.push_str(&format!("    interface eth{i} {{\n"));
        if rng.bool() {
            interfaces.push_str(&format!("        mtu {};\n", MTUS[rng.usize(..MTUS.len())]));
        }
        if rng.bool() {
            let text = DESCRIPTIONS[rng.usize(..DESCRIPTIONS.len())];
            interfaces.push_str(&format!("        description {text};\n"));
        }
        interfaces.push_str("    }\n");
    }

    let mut routes = String::new();
    for net in ROUTES {
        if rng.bool() {
            routes.push_str(&format!(
                "        route {net} {{\n            next-hop {};\n        }}\n",
                HOPS[rng.usize(..HOPS.len())]
            ));
        }
    }

    let mut text = String::new();
    if !interfaces.is_empty() {
        text.push_str(&format!("interfaces {{\n{interfaces}}}\n"));
    }
    if !routes.is_empty() {
        text.push_str(&format!("protocols {{\n    static {{\n{routes}    }}\n}}\n"));
    }
    text
}

fn schema() -> Arc<SchemaTree> {
    common::schema(SCHEMA)
}

fn committed(schema: &Arc<SchemaTree>, text: &str) -> ConfigTree {
    let mut tree = parse_config(Arc::clone(schema), text, 0).unwrap();
    tree.finalize_commit();
    tree
}

#[test]
fn test_merge_then_finalize_reaches_new() {
    let schema = schema();
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..200 {
        let (old_text, new_text) = (random_config(&mut rng), random_config(&mut rng));
        let mut old = committed(&schema, &old_text);
        let new = committed(&schema, &new_text);

        let (delta, deletion) = compute_delta_and_deletion(&old, &new);
        old.merge_deltas(&delta, 0, true).unwrap();
        old.merge_deletions(&deletion, 0, true).unwrap();
        old.finalize_commit();
        assert!(old.is_equivalent(&new), "old:\n{old_text}\nnew:\n{new_text}");
    }
}

#[test]
fn test_merge_then_discard_is_identity() {
    let schema = schema();
    let mut rng = fastrand::Rng::with_seed(11);
    for _ in 0..200 {
        let (old_text, new_text) = (random_config(&mut rng), random_config(&mut rng));
        let mut old = committed(&schema, &old_text);
        let before = old.render(RenderOptions::default());
        let new = committed(&schema, &new_text);

        let (delta, deletion) = compute_delta_and_deletion(&old, &new);
        old.merge_deltas(&delta, 0, true).unwrap();
        old.merge_deletions(&deletion, 0, true).unwrap();
        old.discard_changes();
        assert_eq!(old.render(RenderOptions::default()), before, "new:\n{new_text}");
        assert!(!old.has_uncommitted_changes());
    }
}

#[test]
fn test_self_diff_retains_nothing() {
    let schema = schema();
    let mut rng = fastrand::Rng::with_seed(3);
    for _ in 0..100 {
        let tree = committed(&schema, &random_config(&mut rng));
        let mut copy = tree.clone();
        assert!(!copy.retain_different_nodes(&tree, false));
        assert!(copy.is_empty());
    }
}

#[tokio::test]
async fn test_successive_loads_track_each_file() {
    let schema = schema();
    let coordinator = CommitCoordinator::new(
        Arc::new(ChannelRpc::new()),
        Arc::new(ModuleRegistry::new()),
        Duration::from_secs(5),
    );
    let mut manager = ConfigManager::new(Arc::clone(&schema), coordinator);
    let mut rng = fastrand::Rng::with_seed(42);

    let boot = random_config(&mut rng);
    manager.bootstrap(&boot, 0).await.unwrap();
    for _ in 0..30 {
        let next = random_config(&mut rng);
        manager.load_text(&next, 0).await.unwrap();
        let expected = committed(&schema, &next);
        assert!(manager.running().is_equivalent(&expected), "loaded:\n{next}");
        assert!(!manager.running().has_uncommitted_changes());
    }
}
