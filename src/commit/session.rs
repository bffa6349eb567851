//! Per-attempt commit bookkeeping.
//!
//! A session maps node ids to their transient status for one phase of
//! one commit attempt. It is dropped wholesale when the attempt ends, so
//! the configuration tree never carries transaction state.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use uuid::Uuid;

use crate::commit::rpc::{ActionFuture, RpcError, TransactionId};
use crate::config::NodeId;
use crate::template::Lifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Dry run: commands are expanded and checked, nothing is dispatched.
    Validate,
    Apply,
}

/// First failure recorded for a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    pub command: Lifecycle,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pending: usize,
    failure: Option<ActionFailure>,
}

impl NodeStatus {
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn failure(&self) -> Option<&ActionFailure> {
        self.failure.as_ref()
    }
}

type Completion = BoxFuture<'static, (NodeId, Lifecycle, Result<(), RpcError>)>;

pub struct CommitSession {
    id: Uuid,
    txn: TransactionId,
    phase: Phase,
    action_timeout: Duration,
    statuses: HashMap<NodeId, NodeStatus>,
    inflight: FuturesUnordered<Completion>,
    dispatched: usize,
}

impl CommitSession {
    pub fn new(id: Uuid, txn: TransactionId, phase: Phase, action_timeout: Duration) -> Self {
        Self {
            id,
            txn,
            phase,
            action_timeout,
            statuses: HashMap::new(),
            inflight: FuturesUnordered::new(),
            dispatched: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn txn(&self) -> TransactionId {
        self.txn
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Actions dispatched so far in this session.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn status(&self, node: NodeId) -> Option<&NodeStatus> {
        self.statuses.get(&node)
    }

    fn entry(&mut self, node: NodeId) -> &mut NodeStatus {
        self.statuses.entry(node).or_insert(NodeStatus { pending: 0, failure: None })
    }

    /// Track one dispatched action for `node`. It counts as failed if it
    /// does not complete within the action timeout.
    pub fn record_dispatch(&mut self, node: NodeId, command: Lifecycle, action: ActionFuture) {
        self.entry(node).pending += 1;
        self.dispatched += 1;
        let limit = self.action_timeout;
        self.inflight.push(
            async move {
                let result = match tokio::time::timeout(limit, action).await {
                    Ok(result) => result,
                    Err(_) => Err(RpcError::Timeout(limit)),
                };
                (node, command, result)
            }
            .boxed(),
        );
    }

    /// Record a failure for `node`; only the first one is kept.
    pub fn record_failure(&mut self, node: NodeId, command: Lifecycle, reason: String) {
        let status = self.entry(node);
        if status.failure.is_none() {
            status.failure = Some(ActionFailure { command, reason });
        }
    }

    /// Drive every outstanding action to completion, in whatever order
    /// they finish.
    pub async fn wait_all(&mut self) {
        while let Some((node, command, result)) = self.inflight.next().await {
            let status = self.entry(node);
            status.pending = status.pending.saturating_sub(1);
            if let Err(e) = result {
                tracing::warn!(session = %self.id, node = %node, command = %command, error = %e, "action failed");
                self.record_failure(node, command, e.to_string());
            }
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inflight.len()
    }
}
