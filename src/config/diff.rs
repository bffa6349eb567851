//! Structural diff and merge between configuration trees.
//!
//! Both trees must be built over the same schema: nodes are matched by
//! segment name and schema node at each level.

use std::sync::Arc;

use crate::config::node::{ConfigNode, NodeId};
use crate::config::tree::ConfigTree;

impl ConfigTree {
    /// Whether two nodes (from this tree and `other`) denote the same
    /// configuration, ignoring children and commit state.
    fn is_same(&self, mine: &ConfigNode, theirs: &ConfigNode) -> bool {
        if mine.segname() != theirs.segname() || mine.schema() != theirs.schema() {
            return false;
        }
        if mine.parent().is_none() || theirs.parent().is_none() {
            return true;
        }
        if mine.value() != theirs.value() {
            return false;
        }
        let tag = mine.schema().is_some_and(|s| self.schema().is_tag(s));
        if !tag && mine.value().is_some() && mine.operator() != theirs.operator() {
            return false;
        }
        true
    }

    fn both_leaf_values(&self, mine: &ConfigNode, theirs: &ConfigNode) -> bool {
        let schema = self.schema();
        let leaf = |n: &ConfigNode| n.schema().is_some_and(|s| schema.is_leaf_value(s));
        leaf(mine) && leaf(theirs)
    }

    /// Prune every node identical to its counterpart in `other`. With
    /// `retain_changed_values`, leaves whose value differs are kept;
    /// without it they are pruned as well. Returns whether anything under
    /// the root was retained.
    pub fn retain_different_nodes(&mut self, other: &ConfigTree, retain_changed_values: bool) -> bool {
        let (mine, theirs) = (self.root(), other.root());
        self.retain_different_at(mine, other, theirs, retain_changed_values)
    }

    fn retain_different_at(&mut self, mine: NodeId, other: &ConfigTree, theirs: NodeId, retain_changed: bool) -> bool {
        let mut retained_any = false;
        for my_child in self[mine].children().to_vec() {
            let mut retain = true;
            for their_child in other.children(theirs) {
                let their_node = &other[*their_child];
                if their_node.deleted() {
                    continue;
                }
                if self.is_same(&self[my_child], their_node) {
                    if !self.retain_different_at(my_child, other, *their_child, retain_changed) {
                        retain = false;
                    }
                    break;
                }
                if !retain_changed
                    && self.both_leaf_values(&self[my_child], their_node)
                    && self[my_child].segname() == their_node.segname()
                {
                    retain = false;
                    break;
                }
            }
            if retain {
                retained_any = true;
            } else {
                self.delete_subtree_silently(my_child);
            }
        }
        retained_any
    }

    /// Variant of [`retain_different_nodes`](Self::retain_different_nodes)
    /// used to build deletion trees: a subtree absent from `other` is
    /// collapsed onto its topmost node, and changed leaves are not
    /// deletions.
    pub fn retain_deletion_nodes(&mut self, other: &ConfigTree) -> bool {
        let (mine, theirs) = (self.root(), other.root());
        self.retain_deletion_at(mine, other, theirs)
    }

    fn retain_deletion_at(&mut self, mine: NodeId, other: &ConfigTree, theirs: NodeId) -> bool {
        let mut found_any = false;
        for my_child in self[mine].children().to_vec() {
            let mut node_found = false;
            let mut deletions_below = false;
            for their_child in other.children(theirs) {
                let their_node = &other[*their_child];
                if their_node.deleted() {
                    continue;
                }
                if self.is_same(&self[my_child], their_node) {
                    deletions_below = self.retain_deletion_at(my_child, other, *their_child);
                    node_found = true;
                    break;
                }
                if self.both_leaf_values(&self[my_child], their_node)
                    && self[my_child].segname() == their_node.segname()
                {
                    node_found = true;
                    break;
                }
            }
            if !node_found {
                for grandchild in self[my_child].children().to_vec() {
                    self.delete_subtree_silently(grandchild);
                }
                deletions_below = true;
            }
            if deletions_below {
                found_any = true;
            } else {
                self.delete_subtree_silently(my_child);
            }
        }
        found_any
    }

    /// Keep only the nodes that are identical in `other`. A tag left with
    /// no retained instances is pruned too.
    pub fn retain_common_nodes(&mut self, other: &ConfigTree) -> bool {
        let (mine, theirs) = (self.root(), other.root());
        self.retain_common_at(mine, other, theirs)
    }

    fn retain_common_at(&mut self, mine: NodeId, other: &ConfigTree, theirs: NodeId) -> bool {
        let mut retained_any = false;
        for my_child in self[mine].children().to_vec() {
            let counterpart = other
                .children(theirs)
                .iter()
                .copied()
                .find(|t| !other[*t].deleted() && self.is_same(&self[my_child], &other[*t]));
            match counterpart {
                Some(their_child) => {
                    let retained_below = self.retain_common_at(my_child, other, their_child);
                    let is_tag = self.schema().is_tag(self.schema_id(my_child));
                    if is_tag && !retained_below {
                        self.delete_subtree_silently(my_child);
                    } else {
                        retained_any = true;
                    }
                }
                None => self.delete_subtree_silently(my_child),
            }
        }
        retained_any
    }

    /// Structural and value equality, ignoring child order and commit
    /// state. Nodes marked deleted are ignored on both sides.
    pub fn is_equivalent(&self, other: &ConfigTree) -> bool {
        self.equivalent_at(self.root(), other, other.root())
    }

    fn equivalent_at(&self, mine: NodeId, other: &ConfigTree, theirs: NodeId) -> bool {
        let live = |tree: &ConfigTree, id: NodeId| -> Vec<NodeId> {
            tree.children(id).iter().copied().filter(|c| !tree[*c].deleted()).collect()
        };
        let my_children = live(self, mine);
        let their_children = live(other, theirs);
        if my_children.len() != their_children.len() {
            return false;
        }
        my_children.iter().all(|m| {
            their_children.iter().any(|t| {
                self.is_same(&self[*m], &other[*t]) && self.equivalent_at(*m, other, *t)
            })
        })
    }

    /// Apply a delta tree as edits. Provisional edits change the working
    /// value only; otherwise the committed shadow is updated too.
    pub fn merge_deltas(&mut self, delta: &ConfigTree, user: u32, provisional: bool) -> Result<(), String> {
        if !Arc::ptr_eq(self.schema(), delta.schema()) {
            return Err("configuration trees were built from different schemas".into());
        }
        let (mine, theirs) = (self.root(), delta.root());
        self.merge_delta_at(mine, delta, theirs, user, provisional);
        Ok(())
    }

    fn merge_delta_at(&mut self, mine: NodeId, delta: &ConfigTree, theirs: NodeId, user: u32, provisional: bool) {
        if mine != self.root() {
            let their_node = &delta[theirs];
            let node = self.node_mut(mine);
            if node.deleted {
                node.deleted = false;
                node.value_committed = node.existence_committed && node.matches_committed_value();
            }
            if node.value != their_node.value || node.operator != their_node.operator {
                node.value = their_node.value.clone();
                node.operator = their_node.operator;
                node.touch(user);
                if provisional {
                    node.value_committed = false;
                } else {
                    node.promote();
                }
            }
        }

        for their_child in delta.children(theirs) {
            let their_node = &delta[*their_child];
            if their_node.deleted() {
                continue;
            }
            let existing = self[mine]
                .children()
                .iter()
                .copied()
                .find(|c| self[*c].segname() == their_node.segname() && self[*c].schema() == their_node.schema());
            let child = match existing {
                Some(child) => child,
                None => {
                    let Some(schema) = their_node.schema() else { continue };
                    let child = self.create_child(mine, their_node.segname().to_string(), schema, user);
                    if !provisional {
                        self.node_mut(child).promote();
                    }
                    child
                }
            };
            self.merge_delta_at(child, delta, *their_child, user, provisional);
        }
    }

    /// Apply a deletion tree. Each leaf of `deletions` names a subtree to
    /// delete; provisional deletion only marks it.
    pub fn merge_deletions(&mut self, deletions: &ConfigTree, user: u32, provisional: bool) -> Result<(), String> {
        if !Arc::ptr_eq(self.schema(), deletions.schema()) {
            return Err("configuration trees were built from different schemas".into());
        }
        let (mine, theirs) = (self.root(), deletions.root());
        self.merge_deletion_at(mine, deletions, theirs, user, provisional)
    }

    fn merge_deletion_at(
        &mut self,
        mine: NodeId,
        deletions: &ConfigTree,
        theirs: NodeId,
        user: u32,
        provisional: bool,
    ) -> Result<(), String> {
        for their_child in deletions.children(theirs) {
            let their_node = &deletions[*their_child];
            let found = self[mine]
                .children()
                .iter()
                .copied()
                .find(|c| self[*c].segname() == their_node.segname() && self[*c].schema() == their_node.schema());
            let Some(child) = found else {
                return Err(format!(
                    "Failed to delete node:\n   {}\nNode does not exist.\n",
                    their_node.path()
                ));
            };
            if their_node.children().is_empty() {
                if provisional {
                    self.mark_subtree_for_deletion(child, user);
                } else {
                    self.delete_subtree_silently(child);
                }
            } else {
                self.merge_deletion_at(child, deletions, *their_child, user, provisional)?;
            }
        }
        Ok(())
    }
}

/// Compute `(delta, deletion)` trees taking `old` to `new`.
///
/// The delta holds nodes new or changed in `new`; the deletion tree holds
/// the topmost node of every subtree present in `old` but not in `new`.
pub fn compute_delta_and_deletion(old: &ConfigTree, new: &ConfigTree) -> (ConfigTree, ConfigTree) {
    let mut deletion = old.clone();
    deletion.retain_deletion_nodes(new);
    let mut delta = new.clone();
    delta.retain_different_nodes(old, true);
    (delta, deletion)
}
