//! Runtime modules: which ones a change touches, and in what order.
//!
//! # Data Flow
//! ```text
//! ConfigTree with provisional edits
//!     → order.rs find_changed_modules (create/activate/set/update/delete targets)
//!     → order.rs order_modules (modinfo depends, transitive, cycle check)
//!     → manager.rs ModuleManager::find_or_create per module
//!     → ModuleHandle used by the commit walk
//! ```
//!
//! # Design Decisions
//! - The dependency graph is rebuilt from the schema for every commit
//! - An unsatisfiable graph fails the commit, not the process

pub mod manager;
pub mod order;

pub use manager::{ActionRequest, ModuleError, ModuleHandle, ModuleManager, ModuleRegistry};
pub use order::{find_changed_modules, order_modules, DependencyError, DependencySource};
