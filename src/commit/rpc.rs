//! RPC collaborator contract and the channel-backed client.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use dashmap::DashSet;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::modules::{ActionRequest, ModuleHandle};
use crate::template::Lifecycle;

/// Opaque id scoping one commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub u32);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// An action template with every variable bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundAction {
    pub module: String,
    pub request: String,
    /// Path of the node the action was generated for.
    pub path: String,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("module {module} rejected \"{request}\": {reason}")]
    Rejected { module: String, request: String, reason: String },

    #[error("module {0} is not reachable")]
    Unreachable(String),

    #[error("transaction {0} is not open")]
    NoTransaction(TransactionId),

    #[error("action timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Transport(String),
}

/// Completion of one dispatched action.
pub type ActionFuture = BoxFuture<'static, Result<(), RpcError>>;

/// The transport the coordinator drives.
///
/// `dispatch` queues an action and returns a future resolving to the
/// module's verdict. Every future returned between `begin_transaction`
/// and `end_transaction` belongs to that transaction.
pub trait RpcClient: Send + Sync {
    fn begin_transaction(&self) -> Result<TransactionId, RpcError>;

    /// Open the per-module bracket nested inside `txn`.
    fn start_module(&self, _txn: TransactionId, _module: &str) -> Result<(), RpcError> {
        Ok(())
    }

    fn end_module(&self, _txn: TransactionId, _module: &str) -> Result<(), RpcError> {
        Ok(())
    }

    fn dispatch(&self, txn: TransactionId, module: &ModuleHandle, action: BoundAction) -> Result<ActionFuture, RpcError>;

    fn end_transaction(&self, txn: TransactionId) -> Result<(), RpcError>;
}

/// Delivers actions over each module's in-process channel.
#[derive(Debug, Default)]
pub struct ChannelRpc {
    next_id: AtomicU32,
    open: DashSet<u32>,
}

impl ChannelRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_transactions(&self) -> usize {
        self.open.len()
    }
}

impl RpcClient for ChannelRpc {
    fn begin_transaction(&self) -> Result<TransactionId, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.open.insert(id);
        tracing::debug!(txn = id, "transaction opened");
        Ok(TransactionId(id))
    }

    fn dispatch(&self, txn: TransactionId, module: &ModuleHandle, action: BoundAction) -> Result<ActionFuture, RpcError> {
        if !self.open.contains(&txn.0) {
            return Err(RpcError::NoTransaction(txn));
        }
        let name = module.name().to_string();
        let request = action.request.clone();
        let (reply, verdict) = oneshot::channel();
        module
            .send(ActionRequest { txn, action, reply })
            .map_err(|_| RpcError::Unreachable(name.clone()))?;

        Ok(async move {
            match verdict.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(reason)) => Err(RpcError::Rejected { module: name, request, reason }),
                Err(_) => Err(RpcError::Unreachable(name)),
            }
        }
        .boxed())
    }

    fn end_transaction(&self, txn: TransactionId) -> Result<(), RpcError> {
        match self.open.remove(&txn.0) {
            Some(_) => {
                tracing::debug!(txn = txn.0, "transaction closed");
                Ok(())
            }
            None => Err(RpcError::NoTransaction(txn)),
        }
    }
}
