//! Two-phase commit across modules.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::commit::rpc::{RpcClient, RpcError};
use crate::commit::session::{CommitSession, Phase};
use crate::commit::walk::{walk_module, WalkContext, WalkError};
use crate::config::{CheckError, ConfigTree};
use crate::modules::{find_changed_modules, order_modules, DependencyError, ModuleError, ModuleHandle, ModuleManager};
use crate::observability::metrics::{record_actions_dispatched, record_commit, CommitOutcome};
use crate::template::Lifecycle;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Check(#[from] CheckError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error("transaction failed: {0}")]
    Rpc(#[from] RpcError),

    /// Phase 2 finished with at least one failed action. The tree has
    /// been rolled back; `discarded` is the text of the rolled back edits.
    #[error("{}", status_message(.command, .path))]
    ActionFailed {
        path: String,
        command: Option<Lifecycle>,
        reason: String,
        discarded: String,
    },
}

fn status_message(command: &Option<Lifecycle>, path: &str) -> String {
    let what = match command {
        Some(command) => format!("Error in {command} command for {path}"),
        None => format!("Error committing {path}"),
    };
    format!(
        "WARNING: Commit Failed\n  {what}\n  State may be partially committed - suggest reverting to previous state\n"
    )
}

/// First node that did not commit cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFailure {
    pub path: String,
    pub command: Option<Lifecycle>,
    pub reason: String,
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub session: Uuid,
    /// Modules in the order they were walked.
    pub modules: Vec<String>,
    pub actions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    TwoPhase,
    /// Bootstrap: no dry run and nothing to roll back to.
    SinglePass,
}

impl Mode {
    fn as_str(&self) -> &'static str {
        match self {
            Mode::TwoPhase => "two-phase",
            Mode::SinglePass => "single-pass",
        }
    }
}

/// Every pending node must have no outstanding actions and no recorded
/// failure. Nodes are checked in walk order; the first bad one is returned.
pub fn check_commit_status(tree: &ConfigTree, session: &CommitSession) -> Result<(), StatusFailure> {
    for id in tree.subtree(tree.root()) {
        let node = &tree[id];
        if node.is_committed() {
            continue;
        }
        let Some(status) = session.status(id) else { continue };
        if let Some(failure) = status.failure() {
            return Err(StatusFailure {
                path: node.path().to_string(),
                command: Some(failure.command),
                reason: failure.reason.clone(),
            });
        }
        if status.pending() > 0 {
            return Err(StatusFailure {
                path: node.path().to_string(),
                command: None,
                reason: format!("{} actions still pending", status.pending()),
            });
        }
    }
    Ok(())
}

/// Drives commits of a [`ConfigTree`] across the modules it touches.
///
/// The coordinator holds no tree state; callers hand in the tree for each
/// attempt and only one attempt may run at a time.
pub struct CommitCoordinator {
    rpc: Arc<dyn RpcClient>,
    modules: Arc<dyn ModuleManager>,
    action_timeout: Duration,
}

impl CommitCoordinator {
    pub fn new(rpc: Arc<dyn RpcClient>, modules: Arc<dyn ModuleManager>, action_timeout: Duration) -> Self {
        Self {
            rpc,
            modules,
            action_timeout,
        }
    }

    pub fn action_timeout(&self) -> Duration {
        self.action_timeout
    }

    /// Validate every change, then apply it. On any failure the tree ends
    /// up exactly as it was before the call.
    pub async fn commit_changes(&self, tree: &mut ConfigTree) -> Result<CommitReport, CommitError> {
        self.run(tree, Mode::TwoPhase).await
    }

    /// Apply the first configuration in a single pass. Failures here leave
    /// the process without a usable configuration.
    pub async fn execute(&self, tree: &mut ConfigTree) -> Result<CommitReport, CommitError> {
        self.run(tree, Mode::SinglePass).await
    }

    async fn run(&self, tree: &mut ConfigTree, mode: Mode) -> Result<CommitReport, CommitError> {
        let id = Uuid::new_v4();
        let span = tracing::info_span!("commit", session = %id, mode = mode.as_str());
        let start = Instant::now();
        let result = self.attempt(id, tree, mode).instrument(span).await;
        let outcome = match &result {
            Ok(report) if report.modules.is_empty() => CommitOutcome::Empty,
            Ok(_) => CommitOutcome::Success,
            Err(CommitError::ActionFailed { .. }) => CommitOutcome::Failed,
            Err(_) => CommitOutcome::Rejected,
        };
        record_commit(outcome, start);
        result
    }

    async fn attempt(&self, id: Uuid, tree: &mut ConfigTree, mode: Mode) -> Result<CommitReport, CommitError> {
        let changed = find_changed_modules(tree);
        let order = order_modules(&changed, tree.schema().as_ref())?;
        tree.check_config_tree()?;

        if order.is_empty() {
            tree.finalize_commit();
            tracing::info!("no module affected, changes committed locally");
            return Ok(CommitReport { session: id, modules: order, actions: 0 });
        }
        tracing::info!(modules = ?order, "commit order");

        let handles = order
            .iter()
            .map(|module| self.modules.find_or_create(module).map(|handle| (module.clone(), handle)))
            .collect::<Result<Vec<_>, ModuleError>>()?;

        if mode == Mode::TwoPhase {
            self.validate(id, tree, &handles)?;
        }
        let session = self.apply(id, tree, &handles).await?;

        match check_commit_status(tree, &session) {
            Ok(()) => {
                tree.finalize_commit();
                tracing::info!(actions = session.dispatched(), "commit complete");
                Ok(CommitReport {
                    session: id,
                    modules: order,
                    actions: session.dispatched(),
                })
            }
            Err(failure) => {
                let discarded = tree.discard_changes();
                tracing::warn!(path = %failure.path, reason = %failure.reason, "commit failed, changes discarded");
                Err(CommitError::ActionFailed {
                    path: failure.path,
                    command: failure.command,
                    reason: failure.reason,
                    discarded,
                })
            }
        }
    }

    /// Phase 1: walk every module without dispatching. The transaction is
    /// closed whatever the outcome.
    fn validate(&self, id: Uuid, tree: &ConfigTree, handles: &[(String, ModuleHandle)]) -> Result<(), CommitError> {
        let txn = self.rpc.begin_transaction()?;
        let mut session = CommitSession::new(id, txn, Phase::Validate, self.action_timeout);
        let mut outcome = Ok(());
        for (module, handle) in handles {
            let mut ctx = WalkContext {
                tree,
                module: module.as_str(),
                handle,
                rpc: self.rpc.as_ref(),
                session: &mut session,
            };
            if let Err(e) = walk_module(&mut ctx) {
                tracing::warn!(module = %module, error = %e, "validation failed");
                outcome = Err(CommitError::Walk(e));
                break;
            }
        }
        let closed = self.rpc.end_transaction(txn);
        outcome?;
        closed?;
        Ok(())
    }

    /// Phase 2: walk every module dispatching for real, close the
    /// transaction and wait for every action to finish.
    async fn apply(
        &self,
        id: Uuid,
        tree: &mut ConfigTree,
        handles: &[(String, ModuleHandle)],
    ) -> Result<CommitSession, CommitError> {
        let txn = self.rpc.begin_transaction()?;
        let mut session = CommitSession::new(id, txn, Phase::Apply, self.action_timeout);
        let mut walked = Ok(());
        for (module, handle) in handles {
            let before = session.dispatched();
            let mut ctx = WalkContext {
                tree: &*tree,
                module: module.as_str(),
                handle,
                rpc: self.rpc.as_ref(),
                session: &mut session,
            };
            let result = walk_module(&mut ctx);
            record_actions_dispatched(module, session.dispatched() - before);
            if let Err(e) = result {
                tracing::warn!(module = %module, error = %e, "apply walk aborted");
                walked = Err(e);
                break;
            }
        }
        let closed = self.rpc.end_transaction(txn);
        session.wait_all().await;

        if let Err(e) = walked {
            tree.discard_changes();
            return Err(e.into());
        }
        if let Err(e) = closed {
            tree.discard_changes();
            return Err(e.into());
        }
        Ok(session)
    }
}
