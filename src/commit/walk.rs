//! Node-level commit walk.
//!
//! One walk visits the whole tree on behalf of one module, running only
//! the actions that target that module. Per node: guards, then `create`
//! (new nodes) or `set` (changed values), then the children, then
//! `activate` or `update` on the way back out.

use thiserror::Error;

use crate::commit::rpc::{BoundAction, RpcClient, RpcError};
use crate::commit::session::{CommitSession, Phase};
use crate::config::{ConfigTree, ExpandError, NodeId};
use crate::modules::ModuleHandle;
use crate::template::{ActionCommand, AllowCommand, AllowRangeCommand, Lifecycle, SchemaNode};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalkError {
    #[error("Bad value for \"{path}\": {reason}; No changes have been committed. Correct this error and try again.")]
    BadValue { path: String, reason: String },

    #[error("Parameter error for \"{path}\"\nNo changes have been committed.\nCorrect this error and try again.\n")]
    Parameter {
        path: String,
        #[source]
        cause: ExpandError,
    },

    #[error("Start Transaction failed for module {module}\n")]
    StartModule {
        module: String,
        #[source]
        cause: RpcError,
    },

    #[error("End Transaction failed for module {module}\n")]
    EndModule {
        module: String,
        #[source]
        cause: RpcError,
    },
}

/// Everything a walk for one module needs.
pub struct WalkContext<'a> {
    pub tree: &'a ConfigTree,
    pub module: &'a str,
    pub handle: &'a ModuleHandle,
    pub rpc: &'a dyn RpcClient,
    pub session: &'a mut CommitSession,
}

/// One lifecycle command, as seen by the commit walk.
pub trait LifecycleHandler {
    /// Check the command at `node` without side effects.
    fn validate(&self, tree: &ConfigTree, node: NodeId, module: &str) -> Result<(), WalkError>;

    /// Run the command at `node`. Returns how many actions were dispatched.
    fn apply(&self, ctx: &mut WalkContext<'_>, node: NodeId) -> Result<usize, WalkError>;
}

impl LifecycleHandler for ActionCommand {
    fn validate(&self, tree: &ConfigTree, node: NodeId, module: &str) -> Result<(), WalkError> {
        for action in self.actions_for(module) {
            tree.expand_template(node, &action.request)
                .map_err(|cause| WalkError::Parameter {
                    path: tree[node].path().to_string(),
                    cause,
                })?;
        }
        Ok(())
    }

    /// Expansion and dispatch failures are recorded against the node and
    /// the walk carries on.
    fn apply(&self, ctx: &mut WalkContext<'_>, node: NodeId) -> Result<usize, WalkError> {
        let tree = ctx.tree;
        let module = ctx.module;
        let path = tree[node].path();
        let mut dispatched = 0;
        for action in self.actions_for(module) {
            let request = match tree.expand_template(node, &action.request) {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(path = %path, command = %self.lifecycle, error = %e, "action expansion failed");
                    ctx.session.record_failure(node, self.lifecycle, e.to_string());
                    continue;
                }
            };
            tracing::debug!(module = %module, path = %path, command = %self.lifecycle, request = %request, "dispatch");
            let bound = BoundAction {
                module: module.to_string(),
                request,
                path: path.to_string(),
                lifecycle: self.lifecycle,
            };
            match ctx.rpc.dispatch(ctx.session.txn(), ctx.handle, bound) {
                Ok(completion) => {
                    ctx.session.record_dispatch(node, self.lifecycle, completion);
                    dispatched += 1;
                }
                Err(e) => ctx.session.record_failure(node, self.lifecycle, e.to_string()),
            }
        }
        Ok(dispatched)
    }
}

impl LifecycleHandler for AllowCommand {
    fn validate(&self, tree: &ConfigTree, node: NodeId, _module: &str) -> Result<(), WalkError> {
        match tree.expand_variable(node, &self.variable) {
            Some(value) => self.verify(&value).map_err(|reason| WalkError::BadValue {
                path: tree[node].path().to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn apply(&self, ctx: &mut WalkContext<'_>, node: NodeId) -> Result<usize, WalkError> {
        self.validate(ctx.tree, node, ctx.module).map(|_| 0)
    }
}

impl LifecycleHandler for AllowRangeCommand {
    fn validate(&self, tree: &ConfigTree, node: NodeId, _module: &str) -> Result<(), WalkError> {
        match tree.expand_variable(node, &self.variable) {
            Some(value) => self.verify(&value).map_err(|reason| WalkError::BadValue {
                path: tree[node].path().to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn apply(&self, ctx: &mut WalkContext<'_>, node: NodeId) -> Result<usize, WalkError> {
        self.validate(ctx.tree, node, ctx.module).map(|_| 0)
    }
}

fn run(ctx: &mut WalkContext<'_>, handler: &dyn LifecycleHandler, node: NodeId) -> Result<(), WalkError> {
    match ctx.session.phase() {
        Phase::Validate => handler.validate(ctx.tree, node, ctx.module),
        Phase::Apply => handler.apply(ctx, node).map(|_| ()),
    }
}

/// `allow` takes precedence; `allow-range` only applies without it.
fn guard(schema: &SchemaNode) -> Option<&dyn LifecycleHandler> {
    match (schema.allow(), schema.allow_range()) {
        (Some(allow), _) => Some(allow as &dyn LifecycleHandler),
        (None, Some(range)) => Some(range as &dyn LifecycleHandler),
        (None, None) => None,
    }
}

/// Walk the whole tree for `ctx.module`.
pub fn walk_module(ctx: &mut WalkContext<'_>) -> Result<(), WalkError> {
    let mut needs_update = false;
    let root = ctx.tree.root();
    walk_node(ctx, root, &mut needs_update)
}

fn walk_node(ctx: &mut WalkContext<'_>, id: NodeId, needs_update: &mut bool) -> Result<(), WalkError> {
    let tree = ctx.tree;
    let bracket = if id == tree.root() || ctx.session.phase() == Phase::Validate {
        None
    } else {
        tree.schema_node(id).modinfo().filter(|info| info.module == ctx.module)
    };

    if let Some(info) = bracket {
        ctx.rpc
            .start_module(ctx.session.txn(), &info.module)
            .map_err(|cause| WalkError::StartModule { module: info.module.clone(), cause })?;
    }
    let result = visit(ctx, id, needs_update);
    if let Some(info) = bracket {
        let ended = ctx
            .rpc
            .end_module(ctx.session.txn(), &info.module)
            .map_err(|cause| WalkError::EndModule { module: info.module.clone(), cause });
        result?;
        return ended;
    }
    result
}

fn visit(ctx: &mut WalkContext<'_>, id: NodeId, needs_update: &mut bool) -> Result<(), WalkError> {
    let tree = ctx.tree;
    let node = &tree[id];
    let is_root = id == tree.root();
    let schema = tree.schema_node(id);

    if !is_root && !node.is_committed() {
        if node.deleted() {
            if ctx.session.phase() == Phase::Validate {
                return Ok(());
            }
            if let Some(delete) = schema.action_command(Lifecycle::Delete) {
                return run(ctx, delete, id);
            }
            if node.children().is_empty() {
                if let Some(unset) = schema.action_command(Lifecycle::Unset) {
                    run(ctx, unset, id)?;
                }
            }
        } else {
            if let Some(guard) = guard(schema) {
                run(ctx, guard, id)?;
            }
            let create = if node.existence_committed() {
                None
            } else {
                schema.action_command(Lifecycle::Create)
            };
            if let Some(cmd) = create.or_else(|| schema.action_command(Lifecycle::Set)) {
                run(ctx, cmd, id)?;
            }
        }
    }

    for child in node.children() {
        walk_node(ctx, *child, needs_update)?;
    }

    if is_root || node.deleted() {
        return Ok(());
    }
    if !node.existence_committed() {
        if let Some(activate) = schema.action_command(Lifecycle::Activate) {
            run(ctx, activate, id)?;
        }
    } else if *needs_update || !node.value_committed() {
        match schema.action_command(Lifecycle::Update) {
            Some(update) => {
                *needs_update = false;
                run(ctx, update, id)?;
            }
            None => {
                if !node.value_committed() {
                    *needs_update = true;
                }
            }
        }
    }
    Ok(())
}
