//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;

use router_manager::commit::{ActionFuture, BoundAction, CommitCoordinator, RpcClient, RpcError, TransactionId};
use router_manager::modules::{ModuleHandle, ModuleRegistry};
use router_manager::template::{parse_schema, SchemaTree};

/// Everything the mock RPC client was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcEvent {
    Begin(TransactionId),
    StartModule(TransactionId, String),
    Dispatch(TransactionId, String, String),
    EndModule(TransactionId, String),
    End(TransactionId),
    /// A dispatched action finished; `true` when it succeeded.
    Completed(String, bool),
}

#[derive(Debug, Clone)]
struct Rule {
    prefix: String,
    delay: Duration,
    failure: Option<String>,
}

/// A programmable RPC client. Actions succeed immediately unless a rule
/// matching the start of their request says otherwise.
#[derive(Debug, Default)]
pub struct MockRpc {
    next_id: AtomicU32,
    events: Arc<Mutex<Vec<RpcEvent>>>,
    rules: Mutex<Vec<Rule>>,
}

impl MockRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Requests starting with `prefix` fail with `reason` after `delay`.
    pub fn fail(&self, prefix: &str, delay: Duration, reason: &str) {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.to_string(),
            delay,
            failure: Some(reason.to_string()),
        });
    }

    /// Requests starting with `prefix` succeed after `delay`.
    pub fn delay(&self, prefix: &str, delay: Duration) {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.to_string(),
            delay,
            failure: None,
        });
    }

    pub fn events(&self) -> Vec<RpcEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn transactions(&self) -> usize {
        self.events().iter().filter(|e| matches!(e, RpcEvent::Begin(_))).count()
    }

    /// Requests dispatched to `module`, in dispatch order.
    pub fn dispatched_to(&self, module: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RpcEvent::Dispatch(_, m, request) if m == module => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn dispatch_count(&self) -> usize {
        self.events().iter().filter(|e| matches!(e, RpcEvent::Dispatch(..))).count()
    }

    /// Modules in the order they first received an action.
    pub fn module_order(&self) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        for event in self.events() {
            if let RpcEvent::Dispatch(_, module, _) = event {
                if !order.contains(&module) {
                    order.push(module);
                }
            }
        }
        order
    }

    fn record(&self, event: RpcEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl RpcClient for MockRpc {
    fn begin_transaction(&self) -> Result<TransactionId, RpcError> {
        let txn = TransactionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.record(RpcEvent::Begin(txn));
        Ok(txn)
    }

    fn start_module(&self, txn: TransactionId, module: &str) -> Result<(), RpcError> {
        self.record(RpcEvent::StartModule(txn, module.to_string()));
        Ok(())
    }

    fn end_module(&self, txn: TransactionId, module: &str) -> Result<(), RpcError> {
        self.record(RpcEvent::EndModule(txn, module.to_string()));
        Ok(())
    }

    fn dispatch(&self, txn: TransactionId, _module: &ModuleHandle, action: BoundAction) -> Result<ActionFuture, RpcError> {
        self.record(RpcEvent::Dispatch(txn, action.module.clone(), action.request.clone()));
        let rule = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|r| action.request.starts_with(&r.prefix))
            .cloned();
        let events = Arc::clone(&self.events);

        Ok(async move {
            let (delay, failure) = match rule {
                Some(rule) => (rule.delay, rule.failure),
                None => (Duration::ZERO, None),
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            events
                .lock()
                .unwrap()
                .push(RpcEvent::Completed(action.request.clone(), failure.is_none()));
            match failure {
                Some(reason) => Err(RpcError::Rejected {
                    module: action.module,
                    request: action.request,
                    reason,
                }),
                None => Ok(()),
            }
        }
        .boxed())
    }

    fn end_transaction(&self, txn: TransactionId) -> Result<(), RpcError> {
        self.record(RpcEvent::End(txn));
        Ok(())
    }
}

pub fn schema(source: &str) -> Arc<SchemaTree> {
    Arc::new(parse_schema(source).expect("test schema compiles"))
}

pub fn coordinator(rpc: &Arc<MockRpc>, action_timeout: Duration) -> CommitCoordinator {
    let rpc: Arc<dyn RpcClient> = rpc.clone();
    CommitCoordinator::new(rpc, Arc::new(ModuleRegistry::new()), action_timeout)
}

/// Two modules: `A` owns `a`, and `B`, owning `b`, depends on `A`.
/// `a peer` has no default, so templates naming it only expand once it
/// is configured.
pub const TWO_MODULES: &str = r#"
[[node]]
path = "a"
[node.commands.modinfo]
module = "A"

[[node]]
path = "a peer"
type = "txt"

[[node]]
path = "a value"
type = "u32"
[node.commands]
set = [{ request = "a/set?value=$(@)&peer=$(a.peer)" }]

[[node]]
path = "b"
[node.commands.modinfo]
module = "B"
depends = ["A"]

[[node]]
path = "b value"
type = "u32"
[node.commands]
set = [{ request = "b/set?value=$(@)" }]
"#;
