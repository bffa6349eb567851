//! Configuration instance trees.
//!
//! # Data Flow
//! ```text
//! configuration text
//!     → text.rs (schema-guided parse, typed values)
//!     → ConfigTree (arena of ConfigNode, shared Arc<SchemaTree>)
//!
//! Load over a running tree:
//!     diff.rs compute_delta_and_deletion(running, candidate)
//!     → merge_deltas / merge_deletions (provisional)
//!     → commit finalizes, or discard_changes rolls back
//! ```
//!
//! # Design Decisions
//! - Every node keeps a committed shadow next to its working value
//! - Commit bookkeeping lives in the commit session, not in the nodes
//! - Parse and merge failures never touch the committed state

pub mod diff;
pub mod expand;
pub mod node;
pub mod render;
pub mod text;
pub mod tree;
pub mod validate;

pub use diff::compute_delta_and_deletion;
pub use expand::ExpandError;
pub use node::{CommittedState, ConfigNode, NodeId, Operator, ValueToken};
pub use render::RenderOptions;
pub use text::parse_config;
pub use tree::{ConfigTree, ParseError};
pub use validate::CheckError;
