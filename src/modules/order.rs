//! Changed-module discovery and dependency ordering.

use std::collections::HashSet;

use thiserror::Error;

use crate::config::{ConfigTree, NodeId};
use crate::template::{Lifecycle, ModuleDescriptor, SchemaTree};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// Dependency edges that could not be satisfied, as `(module, depends_on)`.
    #[error("module dependencies cannot be satisfied: {}", format_edges(.remaining))]
    Unsatisfiable { remaining: Vec<(String, String)> },
}

fn format_edges(edges: &[(String, String)]) -> String {
    edges
        .iter()
        .map(|(m, d)| format!("{m} -> {d}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where module dependency metadata comes from.
pub trait DependencySource {
    fn descriptor(&self, module: &str) -> Option<&ModuleDescriptor>;
}

impl DependencySource for SchemaTree {
    fn descriptor(&self, module: &str) -> Option<&ModuleDescriptor> {
        self.module(module)
    }
}

/// Modules with pending work anywhere in `tree`, in discovery order.
pub fn find_changed_modules(tree: &ConfigTree) -> Vec<String> {
    let mut changed = Vec::new();
    for child in tree.children(tree.root()) {
        collect_changed(tree, *child, &mut changed);
    }
    changed
}

fn collect_changed(tree: &ConfigTree, id: NodeId, changed: &mut Vec<String>) {
    let node = &tree[id];
    let schema = tree.schema_node(id);
    let add = |lifecycle: Lifecycle, changed: &mut Vec<String>| {
        if let Some(cmd) = schema.action_command(lifecycle) {
            for module in cmd.affected_modules() {
                push_unique(changed, module);
            }
        }
    };

    if node.deleted() {
        if schema.action_command(Lifecycle::Delete).is_some() {
            add(Lifecycle::Delete, changed);
            return;
        }
        if node.children().is_empty() {
            add(Lifecycle::Unset, changed);
        }
    } else if !node.existence_committed() {
        if let Some(module) = schema.module_name() {
            push_unique(changed, module);
        }
        add(Lifecycle::Create, changed);
        add(Lifecycle::Activate, changed);
    } else if !node.value_committed() {
        // a leaf with neither command relies on an ancestor's update
        if let Some(module) = schema.module_name() {
            push_unique(changed, module);
        }
        add(Lifecycle::Set, changed);
        add(Lifecycle::Update, changed);
    }

    for child in node.children() {
        collect_changed(tree, *child, changed);
    }
}

fn push_unique(list: &mut Vec<String>, module: &str) {
    if !list.iter().any(|m| m == module) {
        list.push(module.to_string());
    }
}

/// Order `changed` so that no module precedes a module it depends on.
///
/// Dependencies that are not themselves changed are pulled in. Modules
/// with no metadata at all go last, unless another module depends on
/// them, in which case they are placed ahead of their dependents.
pub fn order_modules<S>(changed: &[String], source: &S) -> Result<Vec<String>, DependencyError>
where
    S: DependencySource + ?Sized,
{
    match changed {
        [] => return Ok(Vec::new()),
        [only] => return Ok(vec![only.clone()]),
        _ => {}
    }

    let mut ordered: Vec<String> = Vec::new();
    let mut satisfied: HashSet<String> = HashSet::new();
    let mut no_info: Vec<String> = Vec::new();
    let mut edges: Vec<(String, String)> = Vec::new();
    let mut additional: Vec<String> = Vec::new();

    for module in changed {
        let Some(desc) = source.descriptor(module) else {
            tracing::debug!(module = %module, "no module info");
            no_info.push(module.clone());
            continue;
        };
        if desc.depends.is_empty() {
            ordered.push(module.clone());
            satisfied.insert(module.clone());
            continue;
        }
        for dep in &desc.depends {
            tracing::debug!(module = %module, depends_on = %dep, "dependency");
            edges.push((module.clone(), dep.clone()));
            if !changed.contains(dep) && !additional.contains(dep) {
                additional.push(dep.clone());
            }
        }
    }

    // Walk the dependencies of pulled-in modules; `visited` stops cycles.
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue = additional;
    while let Some(module) = queue.pop() {
        if !visited.insert(module.clone()) {
            continue;
        }
        let depends = source.descriptor(&module).map(|d| d.depends.as_slice()).unwrap_or(&[]);
        if depends.is_empty() {
            ordered.push(module.clone());
            satisfied.insert(module);
            continue;
        }
        for dep in depends {
            edges.push((module.clone(), dep.clone()));
            if !changed.contains(dep) && !visited.contains(dep) {
                queue.push(dep.clone());
            }
        }
    }

    // Changed modules with no metadata that others wait on cannot be
    // ordered last.
    no_info.retain(|module| {
        if edges.iter().any(|(_, dep)| dep == module) {
            ordered.push(module.clone());
            satisfied.insert(module.clone());
            false
        } else {
            true
        }
    });

    while !edges.is_empty() {
        let before = edges.len();
        let mut i = 0;
        while i < edges.len() {
            if satisfied.contains(&edges[i].1) {
                let (module, _) = edges.remove(i);
                if !edges.iter().any(|(m, _)| *m == module) && satisfied.insert(module.clone()) {
                    ordered.push(module);
                }
            } else {
                i += 1;
            }
        }
        if edges.len() == before {
            tracing::error!(remaining = %format_edges(&edges), "Module dependencies cannot be satisfied");
            return Err(DependencyError::Unsatisfiable { remaining: edges });
        }
    }

    ordered.extend(no_info);
    Ok(ordered)
}
