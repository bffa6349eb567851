//! Compiled schema tree.

use std::collections::BTreeMap;
use std::ops::Index;

use crate::template::command::{
    ActionCommand, AllowCommand, AllowRangeCommand, Command, Lifecycle, ModuleDescriptor,
};
use crate::template::types::{NodeType, TypeError};

/// Segment name that matches any instance key.
pub const WILDCARD: &str = "@";

/// Index of a node inside its [`SchemaTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub(crate) segname: String,
    pub(crate) path: String,
    pub(crate) parent: Option<SchemaId>,
    pub(crate) children: Vec<SchemaId>,
    pub(crate) node_type: NodeType,
    pub(crate) default: Option<String>,
    pub(crate) commands: BTreeMap<Lifecycle, Command>,
    pub(crate) module_name: Option<String>,
    pub(crate) mandatory: Vec<String>,
    pub(crate) deprecated: Option<String>,
    pub(crate) help: Option<String>,
    /// False for intermediate nodes created implicitly by a deeper path.
    pub(crate) declared: bool,
}

impl SchemaNode {
    fn new(segname: &str, path: String, parent: Option<SchemaId>, node_type: NodeType) -> Self {
        Self {
            segname: segname.to_string(),
            path,
            parent,
            children: Vec::new(),
            node_type,
            default: None,
            commands: BTreeMap::new(),
            module_name: None,
            mandatory: Vec::new(),
            deprecated: None,
            help: None,
            declared: false,
        }
    }

    pub fn segname(&self) -> &str {
        &self.segname
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent(&self) -> Option<SchemaId> {
        self.parent
    }

    pub fn children(&self) -> &[SchemaId] {
        &self.children
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Module owning this subtree, from the nearest `modinfo` at or above.
    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    pub fn mandatory(&self) -> &[String] {
        &self.mandatory
    }

    pub fn deprecated(&self) -> Option<&str> {
        self.deprecated.as_deref()
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn is_wildcard(&self) -> bool {
        self.segname == WILDCARD
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    pub fn command(&self, lifecycle: Lifecycle) -> Option<&Command> {
        self.commands.get(&lifecycle)
    }

    pub fn action_command(&self, lifecycle: Lifecycle) -> Option<&ActionCommand> {
        match self.commands.get(&lifecycle) {
            Some(Command::Actions(cmd)) => Some(cmd),
            _ => None,
        }
    }

    pub fn modinfo(&self) -> Option<&ModuleDescriptor> {
        match self.commands.get(&Lifecycle::ModInfo) {
            Some(Command::ModInfo(info)) => Some(info),
            _ => None,
        }
    }

    pub fn allow(&self) -> Option<&AllowCommand> {
        match self.commands.get(&Lifecycle::Allow) {
            Some(Command::Allow(guard)) => Some(guard),
            _ => None,
        }
    }

    pub fn allow_range(&self) -> Option<&AllowRangeCommand> {
        match self.commands.get(&Lifecycle::AllowRange) {
            Some(Command::AllowRange(guard)) => Some(guard),
            _ => None,
        }
    }

    /// Match a raw value against the declared type and any guard on
    /// this node's own value.
    pub fn type_match(&self, raw: &str) -> Result<String, TypeError> {
        let value = self.node_type.type_match(raw)?;
        match (self.allow(), self.allow_range()) {
            (Some(guard), _) if guard.variable == "$(@)" => guard.verify(&value).map_err(TypeError)?,
            (None, Some(guard)) if guard.variable == "$(@)" && self.node_type.is_numeric() => {
                guard.verify(&value).map_err(TypeError)?
            }
            _ => {}
        }
        Ok(value)
    }
}

/// The compiled, immutable schema.
#[derive(Debug, Clone)]
pub struct SchemaTree {
    pub(crate) nodes: Vec<SchemaNode>,
    pub(crate) modules: BTreeMap<String, SchemaId>,
}

impl SchemaTree {
    pub(crate) fn new() -> Self {
        Self {
            nodes: vec![SchemaNode::new("", String::new(), None, NodeType::Void)],
            modules: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> SchemaId {
        SchemaId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub(crate) fn node_mut(&mut self, id: SchemaId) -> &mut SchemaNode {
        &mut self.nodes[id.0]
    }

    pub(crate) fn push_child(&mut self, parent: SchemaId, segname: &str, node_type: NodeType) -> SchemaId {
        let parent_path = &self.nodes[parent.0].path;
        let path = if parent_path.is_empty() {
            segname.to_string()
        } else {
            format!("{parent_path} {segname}")
        };
        let id = SchemaId(self.nodes.len());
        self.nodes.push(SchemaNode::new(segname, path, Some(parent), node_type));
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn ids(&self) -> impl Iterator<Item = SchemaId> {
        (0..self.nodes.len()).map(SchemaId)
    }

    /// A tag is a group whose children are instance keys.
    pub fn is_tag(&self, id: SchemaId) -> bool {
        self[id].children.iter().any(|c| self[*c].is_wildcard())
    }

    /// A node that carries a comparable typed value.
    pub fn is_leaf_value(&self, id: SchemaId) -> bool {
        let node = &self[id];
        node.children.is_empty() && node.node_type != NodeType::Void && !node.is_wildcard()
    }

    /// Children of `parent` named `segname`, optionally restricted to one type.
    pub fn named_children(&self, parent: SchemaId, segname: &str, ty: Option<NodeType>) -> Vec<SchemaId> {
        self[parent]
            .children
            .iter()
            .copied()
            .filter(|c| self[*c].segname == segname)
            .filter(|c| ty.map_or(true, |t| self[*c].node_type == t))
            .collect()
    }

    /// Look up a node by its space separated path (`seg` or `seg:type`).
    pub fn find_path(&self, path: &str) -> Option<SchemaId> {
        let mut id = self.root();
        for raw in path.split_whitespace() {
            let (segname, ty) = split_qualifier(raw);
            let matches = self.named_children(id, segname, ty);
            match matches.as_slice() {
                [only] => id = *only,
                _ => return None,
            }
        }
        Some(id)
    }

    /// Descriptor for `module`, if any subtree declares it.
    pub fn module(&self, module: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(module).and_then(|id| self[*id].modinfo())
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Resolve a `$(...)` reference made from `from` to the schema node it
    /// names. Special forms resolve to `from` itself.
    pub fn find_varname_node(&self, from: SchemaId, varname: &str) -> Option<SchemaId> {
        let name = strip_var(varname)?;
        if matches!(name, "@" | "<>" | "#" | "DEFAULT") {
            return Some(from);
        }
        let mut parts: Vec<&str> = name.split('.').collect();
        if parts.last() == Some(&"DEFAULT") {
            parts.pop();
        }
        if parts.is_empty() {
            return Some(from);
        }
        if parts[0] == WILDCARD {
            return self.descend(from, &parts[1..]);
        }
        if parts.len() == 1 {
            if self[from].segname == parts[0] {
                return Some(from);
            }
            if let Some(child) = self.descend(from, &parts) {
                return Some(child);
            }
        }
        let mut cursor = Some(from);
        while let Some(id) = cursor {
            if self[id].segname == parts[0] {
                if let Some(found) = self.descend(id, &parts[1..]) {
                    return Some(found);
                }
            }
            cursor = self[id].parent;
        }
        None
    }

    fn descend(&self, from: SchemaId, parts: &[&str]) -> Option<SchemaId> {
        let Some((first, rest)) = parts.split_first() else {
            return Some(from);
        };
        self[from]
            .children
            .iter()
            .filter(|c| self[**c].segname == *first)
            .find_map(|c| self.descend(*c, rest))
    }
}

impl Index<SchemaId> for SchemaTree {
    type Output = SchemaNode;

    fn index(&self, id: SchemaId) -> &SchemaNode {
        &self.nodes[id.0]
    }
}

/// Split `seg:type` into the segment and its type qualifier. A suffix that
/// is not a type name is part of the segment (IPv6 and MAC keys).
pub fn split_qualifier(raw: &str) -> (&str, Option<NodeType>) {
    if let Some((segname, ty)) = raw.rsplit_once(':') {
        if !segname.is_empty() {
            if let Ok(ty) = ty.parse::<NodeType>() {
                return (segname, Some(ty));
            }
        }
    }
    (raw, None)
}

/// Inner name of a `$(name)` reference.
pub fn strip_var(varname: &str) -> Option<&str> {
    varname.strip_prefix("$(")?.strip_suffix(')')
}
