//! Configuration instance nodes.

use std::fmt;
use std::time::SystemTime;

use crate::template::SchemaId;

/// Index of a node inside its [`ConfigTree`](crate::config::ConfigTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Operator applied with a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operator {
    #[default]
    Assign,
    Add,
    Subtract,
    Compare,
}

impl Operator {
    pub fn token(&self) -> &'static str {
        match self {
            Operator::Assign => "=",
            Operator::Add => "+=",
            Operator::Subtract => "-=",
            Operator::Compare => "==",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "=" | ":" => Some(Operator::Assign),
            "+=" => Some(Operator::Add),
            "-=" => Some(Operator::Subtract),
            "==" => Some(Operator::Compare),
            _ => None,
        }
    }
}

/// A value token as it appeared in configuration text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueToken {
    /// Raw text, including surrounding quotes when `quoted`.
    pub text: String,
    pub quoted: bool,
}

impl ValueToken {
    pub fn bare(text: impl Into<String>) -> Self {
        Self { text: text.into(), quoted: false }
    }

    pub fn quoted(raw: impl Into<String>) -> Self {
        Self { text: raw.into(), quoted: true }
    }

    pub fn empty() -> Self {
        Self::bare("")
    }
}

/// Last known-good state of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedState {
    pub value: Option<String>,
    pub operator: Operator,
    pub user: u32,
    pub modified: SystemTime,
}

#[derive(Debug, Clone)]
pub struct ConfigNode {
    pub(crate) segname: String,
    pub(crate) path: String,
    pub(crate) schema: Option<SchemaId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) value: Option<String>,
    pub(crate) operator: Operator,
    pub(crate) user: u32,
    pub(crate) modified: SystemTime,
    pub(crate) existence_committed: bool,
    pub(crate) value_committed: bool,
    pub(crate) deleted: bool,
    pub(crate) committed: CommittedState,
}

impl ConfigNode {
    pub(crate) fn new(
        segname: String,
        path: String,
        schema: Option<SchemaId>,
        parent: Option<NodeId>,
        user: u32,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            segname,
            path,
            schema,
            parent,
            children: Vec::new(),
            value: None,
            operator: Operator::Assign,
            user,
            modified: now,
            existence_committed: false,
            value_committed: false,
            deleted: false,
            committed: CommittedState {
                value: None,
                operator: Operator::Assign,
                user,
                modified: now,
            },
        }
    }

    pub fn segname(&self) -> &str {
        &self.segname
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn schema(&self) -> Option<SchemaId> {
        self.schema
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn user(&self) -> u32 {
        self.user
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn existence_committed(&self) -> bool {
        self.existence_committed
    }

    pub fn value_committed(&self) -> bool {
        self.value_committed
    }

    pub fn deleted(&self) -> bool {
        self.deleted
    }

    pub fn committed(&self) -> &CommittedState {
        &self.committed
    }

    /// True when neither existence nor value has pending edits.
    pub fn is_committed(&self) -> bool {
        self.existence_committed && self.value_committed
    }

    pub(crate) fn touch(&mut self, user: u32) {
        self.user = user;
        self.modified = SystemTime::now();
    }

    /// Promote the working fields to the committed shadow.
    pub(crate) fn promote(&mut self) {
        self.committed = CommittedState {
            value: self.value.clone(),
            operator: self.operator,
            user: self.user,
            modified: self.modified,
        };
        self.existence_committed = true;
        self.value_committed = true;
    }

    /// Restore the working fields from the committed shadow.
    pub(crate) fn restore(&mut self) {
        self.value = self.committed.value.clone();
        self.operator = self.committed.operator;
        self.user = self.committed.user;
        self.modified = self.committed.modified;
        self.value_committed = true;
        self.deleted = false;
    }

    pub(crate) fn matches_committed_value(&self) -> bool {
        self.committed.value == self.value && self.committed.operator == self.operator
    }
}
