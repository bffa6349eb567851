//! Module manager: resolves module names to runnable handles.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::commit::rpc::{BoundAction, TransactionId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("module {0} is not known")]
    Unknown(String),

    #[error("module {module} could not be started: {reason}")]
    StartFailed { module: String, reason: String },
}

/// One action delivered to a module, with a reply channel for its verdict.
#[derive(Debug)]
pub struct ActionRequest {
    pub txn: TransactionId,
    pub action: BoundAction,
    pub reply: oneshot::Sender<Result<(), String>>,
}

/// Cloneable address of a running module.
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<ActionRequest>,
}

impl ModuleHandle {
    pub fn new(name: &str, tx: mpsc::UnboundedSender<ActionRequest>) -> Self {
        Self { name: Arc::from(name), tx }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver a request; fails when the module's inbox is gone.
    pub fn send(&self, request: ActionRequest) -> Result<(), ActionRequest> {
        self.tx.send(request).map_err(|e| e.0)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Finds a running module or starts one.
pub trait ModuleManager: Send + Sync {
    fn find_or_create(&self, module: &str) -> Result<ModuleHandle, ModuleError>;
}

type Handler = dyn Fn(&BoundAction) -> Result<(), String> + Send + Sync;

/// In-process module registry.
///
/// Modules are tokio tasks reading [`ActionRequest`]s off an unbounded
/// channel. Names with no registered implementation get a task that logs
/// each action and acknowledges it, unless the registry is strict.
pub struct ModuleRegistry {
    modules: DashMap<String, ModuleHandle>,
    strict: bool,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: DashMap::new(),
            strict: false,
        }
    }

    /// A registry that only knows explicitly registered modules.
    pub fn strict() -> Self {
        Self {
            modules: DashMap::new(),
            strict: true,
        }
    }

    /// Register a module whose inbox the caller drains.
    pub fn register(&self, module: &str) -> mpsc::UnboundedReceiver<ActionRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.modules.insert(module.to_string(), ModuleHandle::new(module, tx));
        rx
    }

    /// Register a module implemented by `handler`, run on its own task.
    pub fn spawn_module<F>(&self, module: &str, handler: F) -> Result<ModuleHandle, ModuleError>
    where
        F: Fn(&BoundAction) -> Result<(), String> + Send + Sync + 'static,
    {
        let handle = start_task(module, Arc::new(handler))?;
        self.modules.insert(module.to_string(), handle.clone());
        Ok(handle)
    }

    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleManager for ModuleRegistry {
    fn find_or_create(&self, module: &str) -> Result<ModuleHandle, ModuleError> {
        if let Some(handle) = self.modules.get(module).map(|h| h.clone()) {
            if !handle.is_closed() {
                return Ok(handle);
            }
            tracing::warn!(module = %module, "module inbox closed, restarting");
            self.modules.remove(module);
        }
        if self.strict {
            return Err(ModuleError::Unknown(module.to_string()));
        }
        let handle = self
            .modules
            .entry(module.to_string())
            .or_try_insert_with(|| start_task(module, Arc::new(acknowledge)))?
            .clone();
        Ok(handle)
    }
}

fn acknowledge(action: &BoundAction) -> Result<(), String> {
    tracing::info!(
        module = %action.module,
        path = %action.path,
        command = %action.lifecycle,
        request = %action.request,
        "action acknowledged"
    );
    Ok(())
}

fn start_task(module: &str, handler: Arc<Handler>) -> Result<ModuleHandle, ModuleError> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|e| ModuleError::StartFailed {
        module: module.to_string(),
        reason: e.to_string(),
    })?;
    let (tx, mut rx) = mpsc::unbounded_channel::<ActionRequest>();
    let name = module.to_string();
    runtime.spawn(async move {
        while let Some(request) = rx.recv().await {
            let verdict = handler(&request.action);
            if let Err(reason) = &verdict {
                tracing::warn!(module = %name, txn = %request.txn, reason = %reason, "action rejected");
            }
            let _ = request.reply.send(verdict);
        }
        tracing::debug!(module = %name, "module inbox closed");
    });
    tracing::info!(module = %module, "module started");
    Ok(ModuleHandle::new(module, tx))
}
