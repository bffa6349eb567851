//! Schema (template) subsystem.
//!
//! # Data Flow
//! ```text
//! schema file (TOML)
//!     → loader.rs (deserialize node specs, build the tree)
//!     → loader.rs expansion pass (module ownership, deferred targets,
//!       variable reference checks)
//!     → SchemaTree (immutable, shared via Arc with every ConfigTree)
//! ```
//!
//! # Design Decisions
//! - Nodes live in an arena addressed by `SchemaId`; parents are indices
//! - Lifecycle commands are a closed enum, not string keys
//! - A node with wildcard (`@`) children is a tag; instance keys are typed

pub mod command;
pub mod loader;
pub mod tree;
pub mod types;

pub use command::{
    template_variables, ActionCommand, ActionTarget, ActionTemplate, AllowCommand, AllowRangeCommand, AllowedRange,
    AllowedValue, Command, Lifecycle, ModuleDescriptor,
};
pub use loader::{load_schema, parse_schema, SchemaError};
pub use tree::{SchemaId, SchemaNode, SchemaTree, WILDCARD};
pub use types::{NodeType, TypeError};
