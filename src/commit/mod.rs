//! Transactional commit of provisional edits across modules.
//!
//! # Data Flow
//! ```text
//! ConfigTree (provisional edits)
//!     → modules::order (changed modules, dependency order)
//!     → check_config_tree
//!     → phase 1: begin_transaction, walk.rs per module (validate only), end
//!     → phase 2: begin_transaction, walk.rs per module (dispatch), end
//!     → session.rs wait_all (FuturesUnordered, per-action timeout)
//!     → check_commit_status
//!     → finalize_commit | discard_changes
//! ```
//!
//! # Design Decisions
//! - Transient per-node status lives in CommitSession, keyed by NodeId
//! - Dispatched actions always run to completion; a failure only changes the verdict
//! - A failed phase 2 rolls the whole tree back and names the first failing node

pub mod coordinator;
pub mod rpc;
pub mod session;
pub mod walk;

pub use coordinator::{check_commit_status, CommitCoordinator, CommitError, CommitReport, StatusFailure};
pub use rpc::{ActionFuture, BoundAction, ChannelRpc, RpcClient, RpcError, TransactionId};
pub use session::{ActionFailure, CommitSession, NodeStatus, Phase};
pub use walk::{LifecycleHandler, WalkContext, WalkError};
