//! Text and JSON rendering of configuration trees.

use serde_json::{Map, Value};

use crate::config::node::{NodeId, Operator};
use crate::config::tree::ConfigTree;
use crate::template::types::quote;
use crate::template::NodeType;

const INDENT: &str = "    ";

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Prefix lines with `>` (uncommitted) or `-` (deleted) and show
    /// nodes marked deleted.
    pub annotate: bool,
    /// Omit leaves whose value equals the schema default.
    pub suppress_defaults: bool,
}

impl RenderOptions {
    pub fn annotated() -> Self {
        Self { annotate: true, suppress_defaults: false }
    }
}

impl ConfigTree {
    /// Render the whole tree in configuration-file syntax.
    pub fn render(&self, options: RenderOptions) -> String {
        let mut out = String::new();
        for child in self.children(self.root()) {
            self.render_node(*child, 0, options, &mut out);
        }
        out
    }

    /// Render one node and its subtree as a top-level statement. Instance
    /// nodes render as their key.
    pub fn render_subtree(&self, id: NodeId, options: RenderOptions) -> String {
        let mut out = String::new();
        if self.schema_node(id).is_wildcard() {
            self.render_instance(id, None, 0, options, &mut out);
        } else {
            self.render_node(id, 0, options, &mut out);
        }
        out
    }

    fn visible(&self, id: NodeId, options: RenderOptions) -> bool {
        let node = &self[id];
        if node.deleted() && !options.annotate {
            return false;
        }
        if options.suppress_defaults {
            let schema = self.schema_node(id);
            if schema.children().is_empty() && schema.default_value().is_some() && node.value() == schema.default_value() {
                return false;
            }
        }
        true
    }

    fn marker(&self, id: NodeId, options: RenderOptions) -> &'static str {
        if !options.annotate {
            return "";
        }
        let node = &self[id];
        if node.deleted() {
            "-   "
        } else if !node.is_committed() {
            ">   "
        } else {
            "    "
        }
    }

    fn render_node(&self, id: NodeId, depth: usize, options: RenderOptions, out: &mut String) {
        if !self.visible(id, options) {
            return;
        }
        let node = &self[id];
        let schema_id = self.schema_id(id);
        let schema = self.schema();

        if schema.is_tag(schema_id) {
            let (instances, others): (Vec<NodeId>, Vec<NodeId>) = node
                .children()
                .iter()
                .copied()
                .partition(|c| self.schema_node(*c).is_wildcard());
            for instance in instances {
                self.render_instance(instance, Some(node.segname()), depth, options, out);
            }
            if !others.is_empty() {
                self.open_line(id, depth, options, out, node.segname());
                out.push_str(" {\n");
                self.render_children(&others, depth + 1, options, out);
                self.close_block(depth, options, out);
            }
            return;
        }

        self.open_line(id, depth, options, out, node.segname());
        let node_type = schema[schema_id].node_type();
        if let Some(value) = node.value().filter(|_| node_type != NodeType::Void) {
            if node.operator() != Operator::Assign {
                out.push(' ');
                out.push_str(node.operator().token());
            }
            out.push(' ');
            out.push_str(&format_value(node_type, value));
        }
        if schema[schema_id].children().is_empty() {
            out.push_str(";\n");
        } else {
            out.push_str(" {\n");
            self.render_children(node.children(), depth + 1, options, out);
            self.close_block(depth, options, out);
        }
    }

    fn render_instance(&self, id: NodeId, tag: Option<&str>, depth: usize, options: RenderOptions, out: &mut String) {
        if !self.visible(id, options) {
            return;
        }
        let node = &self[id];
        let key = format_key(self.schema_node(id).node_type(), node.segname());
        let head = match tag {
            Some(tag) => format!("{tag} {key}"),
            None => key,
        };
        self.open_line(id, depth, options, out, &head);
        let shown: Vec<NodeId> = node
            .children()
            .iter()
            .copied()
            .filter(|c| self.visible(*c, options))
            .collect();
        if shown.is_empty() {
            out.push_str(";\n");
        } else {
            out.push_str(" {\n");
            self.render_children(&shown, depth + 1, options, out);
            self.close_block(depth, options, out);
        }
    }

    fn render_children(&self, children: &[NodeId], depth: usize, options: RenderOptions, out: &mut String) {
        for child in children {
            self.render_node(*child, depth, options, out);
        }
    }

    fn open_line(&self, id: NodeId, depth: usize, options: RenderOptions, out: &mut String, head: &str) {
        out.push_str(self.marker(id, options));
        for _ in 0..depth {
            out.push_str(INDENT);
        }
        out.push_str(head);
    }

    fn close_block(&self, depth: usize, options: RenderOptions, out: &mut String) {
        if options.annotate {
            out.push_str(INDENT);
        }
        for _ in 0..depth {
            out.push_str(INDENT);
        }
        out.push_str("}\n");
    }

    /// JSON view of the live (non-deleted) configuration.
    pub fn to_json(&self) -> Value {
        self.json_children(self.root())
    }

    fn json_children(&self, id: NodeId) -> Value {
        let mut map = Map::new();
        for child in self.children(id) {
            let node = &self[*child];
            if node.deleted() {
                continue;
            }
            map.insert(node.segname().to_string(), self.json_node(*child));
        }
        Value::Object(map)
    }

    fn json_node(&self, id: NodeId) -> Value {
        let node = &self[id];
        let schema_id = self.schema_id(id);
        let schema = self.schema();
        if !schema[schema_id].children().is_empty() || schema.is_tag(schema_id) {
            return self.json_children(id);
        }
        match node.value() {
            Some(value) if schema[schema_id].node_type() != NodeType::Void => Value::String(value.to_string()),
            _ => Value::Bool(true),
        }
    }
}

fn format_value(node_type: NodeType, value: &str) -> String {
    if node_type == NodeType::Text {
        quote(value)
    } else {
        value.to_string()
    }
}

fn format_key(node_type: NodeType, key: &str) -> String {
    let plain = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':'));
    if node_type == NodeType::Text && !plain {
        quote(key)
    } else {
        key.to_string()
    }
}
