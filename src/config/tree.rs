//! Configuration instance tree.

use std::ops::Index;
use std::sync::Arc;

use thiserror::Error;

use crate::config::node::{ConfigNode, NodeId, Operator, ValueToken};
use crate::config::render::RenderOptions;
use crate::template::types::{classify, unquote};
use crate::template::{NodeType, SchemaId, SchemaNode, SchemaTree, WILDCARD};

/// Errors raised while building a tree from configuration text.
///
/// A failed parse never touches the committed tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("need to qualify type of {segment}")]
    NeedsQualification { segment: String },

    #[error("no template found for \"{path}\"")]
    NoTemplate { path: String },

    #[error("\"{path}\" has type {node_type}, and value {value} is not a valid {node_type}")]
    TypeMismatch {
        path: String,
        node_type: NodeType,
        value: String,
    },

    #[error("cannot set the value of \"{path}\": {reason}")]
    InvalidValue { path: String, reason: String },

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("line {line}: {source}")]
    Located {
        line: usize,
        #[source]
        source: Box<ParseError>,
    },
}

impl ParseError {
    /// The underlying error without line information.
    pub fn root_cause(&self) -> &ParseError {
        match self {
            ParseError::Located { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn at_line(self, line: usize) -> Self {
        match self {
            located @ ParseError::Located { .. } => located,
            other => ParseError::Located { line, source: Box::new(other) },
        }
    }
}

/// An instance tree validated against a shared schema.
///
/// Slots freed by removed nodes are reused, so a stale [`NodeId`] may come
/// to name a different node after a removal.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    schema: Arc<SchemaTree>,
    nodes: Vec<Option<ConfigNode>>,
    free: Vec<NodeId>,
}

impl ConfigTree {
    pub fn new(schema: Arc<SchemaTree>) -> Self {
        let mut root = ConfigNode::new(String::new(), String::new(), None, None, 0);
        root.existence_committed = true;
        root.value_committed = true;
        Self {
            schema,
            nodes: vec![Some(root)],
            free: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Arc<SchemaTree> {
        &self.schema
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> Option<&ConfigNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut ConfigNode {
        match self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("stale config node id {id}"),
        }
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self[id].children
    }

    /// Schema id of a node; the root maps to the schema root.
    pub fn schema_id(&self, id: NodeId) -> SchemaId {
        self[id].schema.unwrap_or_else(|| self.schema.root())
    }

    pub fn schema_node(&self, id: NodeId) -> &SchemaNode {
        &self.schema[self.schema_id(id)]
    }

    /// True when the root has no children.
    pub fn is_empty(&self) -> bool {
        self[self.root()].children.is_empty()
    }

    /// Number of live nodes, excluding the root.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count() - 1
    }

    /// Depth-first ids of the subtree rooted at `id`, parents first.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self[next].children.iter().rev().copied());
        }
        out
    }

    /// Find a node by the segment names on its path.
    pub fn find_segments(&self, segments: &[&str]) -> Option<NodeId> {
        let mut id = self.root();
        for segment in segments {
            id = *self[id].children.iter().find(|c| self[**c].segname == *segment)?;
        }
        Some(id)
    }

    /// Find a node by its space separated path.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let segments: Vec<&str> = path.split_whitespace().collect();
        self.find_segments(&segments)
    }

    /// 1-based position of a node among siblings sharing its schema node.
    pub fn ordinal(&self, id: NodeId) -> usize {
        let node = &self[id];
        let Some(parent) = node.parent else { return 0 };
        self[parent]
            .children
            .iter()
            .filter(|c| self[**c].schema == node.schema)
            .position(|c| *c == id)
            .map_or(0, |p| p + 1)
    }

    pub fn has_uncommitted_changes(&self) -> bool {
        self.nodes.iter().flatten().any(|n| !n.is_committed())
    }

    /// Resolve one path segment under `parent`, creating the node when the
    /// schema allows it.
    ///
    /// Existing children are matched by name first; two same-named children
    /// that are not told apart by `qualifier` are an error. Otherwise a named
    /// schema child is preferred over a wildcard whose type accepts the
    /// segment.
    pub fn add_node(
        &mut self,
        parent: NodeId,
        segment: &str,
        qualifier: Option<NodeType>,
        user: u32,
    ) -> Result<NodeId, ParseError> {
        let name = unquote(segment);
        let existing = self.matching_children(parent, &name, qualifier);
        match existing.as_slice() {
            [only] => return Ok(*only),
            [] => {}
            _ => return Err(ParseError::NeedsQualification { segment: name }),
        }

        let schema_parent = self.schema_id(parent);
        let (schema_id, segname, value) = self.resolve_template(parent, schema_parent, segment, &name, qualifier)?;

        if let Some(found) = self[parent]
            .children
            .iter()
            .copied()
            .find(|c| self[*c].schema == Some(schema_id) && self[*c].segname == segname)
        {
            return Ok(found);
        }

        let id = self.create_child(parent, segname, schema_id, user);
        self.node_mut(id).value = value;
        Ok(id)
    }

    fn matching_children(&self, parent: NodeId, name: &str, qualifier: Option<NodeType>) -> Vec<NodeId> {
        self[parent]
            .children
            .iter()
            .copied()
            .filter(|c| self[*c].segname == name)
            .filter(|c| qualifier.map_or(true, |t| self.schema_node(*c).node_type() == t))
            .collect()
    }

    fn resolve_template(
        &self,
        parent: NodeId,
        schema_parent: SchemaId,
        segment: &str,
        name: &str,
        qualifier: Option<NodeType>,
    ) -> Result<(SchemaId, String, Option<String>), ParseError> {
        let schema = &self.schema;
        let exact = schema.named_children(schema_parent, name, qualifier);
        match exact.as_slice() {
            [only] => return Ok((*only, name.to_string(), None)),
            [] => {}
            _ => return Err(ParseError::NeedsQualification { segment: name.to_string() }),
        }

        let wildcards = schema.named_children(schema_parent, WILDCARD, qualifier);
        let mut accepted = Vec::new();
        let mut rejection = None;
        for candidate in &wildcards {
            match schema[*candidate].type_match(segment) {
                Ok(normalized) => accepted.push((*candidate, normalized)),
                Err(e) => rejection = Some(e),
            }
        }
        let path = join_path(&self[parent].path, name);
        match (accepted.len(), wildcards.len(), rejection) {
            (1, _, _) => {
                let (id, normalized) = accepted.remove(0);
                Ok((id, normalized.clone(), Some(normalized)))
            }
            (0, 1, Some(e)) => Err(ParseError::InvalidValue { path, reason: e.0 }),
            (0, _, _) => Err(ParseError::NoTemplate { path }),
            _ => Err(ParseError::NeedsQualification { segment: name.to_string() }),
        }
    }

    pub(crate) fn create_child(&mut self, parent: NodeId, segname: String, schema: SchemaId, user: u32) -> NodeId {
        let path = join_path(&self[parent].path, &segname);
        let node = ConfigNode::new(segname, path, Some(schema), Some(parent), user);
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot.0] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        self.node_mut(parent).children.push(id);
        id
    }

    /// Set a leaf's working value from a parsed token.
    ///
    /// An empty token on a `bool` node means `true`. A quoted token is
    /// always offered to the type matcher; a bare token whose syntactic
    /// class cannot be the node's type is rejected as a mismatch.
    pub fn set_value(
        &mut self,
        id: NodeId,
        token: &ValueToken,
        operator: Operator,
        user: u32,
    ) -> Result<(), ParseError> {
        let schema = self.schema_node(id);
        let node_type = schema.node_type();
        let path = self[id].path.clone();

        let raw = if token.text.is_empty() && !token.quoted {
            match node_type {
                NodeType::Void => return Ok(()),
                NodeType::Bool => "true".to_string(),
                _ => {
                    return Err(ParseError::InvalidValue {
                        path,
                        reason: "a value is required".into(),
                    })
                }
            }
        } else {
            token.text.clone()
        };

        if !token.quoted && !node_type.accepts_class(classify(&raw)) {
            return Err(ParseError::TypeMismatch { path, node_type, value: raw });
        }
        let normalized = schema
            .type_match(&raw)
            .map_err(|e| ParseError::InvalidValue { path, reason: e.0 })?;

        let node = self.node_mut(id);
        node.value = Some(normalized);
        node.operator = operator;
        node.touch(user);
        node.value_committed = node.existence_committed && node.matches_committed_value();
        Ok(())
    }

    /// Remove a subtree immediately, without any commit bookkeeping.
    pub fn delete_subtree_silently(&mut self, id: NodeId) {
        if id == self.root() {
            for child in self[id].children.clone() {
                self.delete_subtree_silently(child);
            }
            return;
        }
        if let Some(parent) = self[id].parent {
            self.node_mut(parent).children.retain(|c| *c != id);
        }
        for gone in self.subtree(id) {
            self.nodes[gone.0] = None;
            self.free.push(gone);
        }
    }

    /// Mark a subtree as provisionally deleted. Nodes that were never
    /// committed are removed outright.
    pub fn mark_subtree_for_deletion(&mut self, id: NodeId, user: u32) {
        if !self[id].existence_committed {
            self.delete_subtree_silently(id);
            return;
        }
        for child in self[id].children.clone() {
            self.mark_subtree_for_deletion(child, user);
        }
        let node = self.node_mut(id);
        node.deleted = true;
        node.value_committed = false;
        node.touch(user);
    }

    /// Give every live group the schema children that declare a default
    /// and are not configured.
    pub fn add_default_children(&mut self, user: u32) {
        for id in self.subtree(self.root()) {
            if self.get(id).map_or(true, |n| n.deleted) {
                continue;
            }
            let schema_id = self.schema_id(id);
            let schema = Arc::clone(&self.schema);
            for child in schema[schema_id].children() {
                let template = &schema[*child];
                let Some(default) = template.default_value() else { continue };
                if template.is_wildcard() {
                    continue;
                }
                let present = self[id].children.iter().any(|c| self[*c].schema == Some(*child));
                if !present {
                    let new = self.create_child(id, template.segname().to_string(), *child, user);
                    self.node_mut(new).value = Some(default.to_string());
                }
            }
        }
    }

    /// Promote all pending edits after a successful commit. Nodes marked
    /// deleted are physically removed.
    pub fn finalize_commit(&mut self) {
        self.finalize_node(self.root());
    }

    fn finalize_node(&mut self, id: NodeId) {
        if id != self.root() && self[id].deleted {
            self.delete_subtree_silently(id);
            return;
        }
        let node = self.node_mut(id);
        if !node.is_committed() {
            node.promote();
        }
        for child in self[id].children.clone() {
            self.finalize_node(child);
        }
    }

    /// Roll every pending edit back to the committed shadow. Returns the
    /// text of everything discarded.
    pub fn discard_changes(&mut self) -> String {
        let mut discarded = String::new();
        self.discard_node(self.root(), &mut discarded);
        discarded
    }

    fn discard_node(&mut self, id: NodeId, discarded: &mut String) {
        if id != self.root() {
            let node = &self[id];
            if !node.existence_committed {
                let parent_path = node.parent.map(|p| self[p].path.clone()).unwrap_or_default();
                let text = self.render_subtree(id, RenderOptions::default());
                if !parent_path.is_empty() {
                    discarded.push_str(&parent_path);
                    discarded.push(' ');
                }
                discarded.push_str(&text);
                self.delete_subtree_silently(id);
                return;
            }
            if !node.value_committed {
                let node = self.node_mut(id);
                node.restore();
                discarded.push_str(&node.path);
                if let Some(value) = &node.value {
                    discarded.push(' ');
                    discarded.push_str(value);
                }
                discarded.push_str(";\n");
            }
        }
        for child in self[id].children.clone() {
            self.discard_node(child, discarded);
        }
    }
}

impl Index<NodeId> for ConfigTree {
    type Output = ConfigNode;

    fn index(&self, id: NodeId) -> &ConfigNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale config node id {id}"),
        }
    }
}

fn join_path(parent: &str, segname: &str) -> String {
    if parent.is_empty() {
        segname.to_string()
    } else {
        format!("{parent} {segname}")
    }
}
