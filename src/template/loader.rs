//! Schema loading from TOML source.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::template::command::{
    template_variables, ActionCommand, ActionTarget, ActionTemplate, AllowCommand, AllowRangeCommand,
    AllowedRange, AllowedValue, Command, Lifecycle, ModuleDescriptor,
};
use crate::template::tree::{split_qualifier, SchemaId, SchemaTree, WILDCARD};
use crate::template::types::NodeType;

/// Errors raised while building the schema. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse schema: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid schema path \"{0}\"")]
    InvalidPath(String),

    #[error("\"{path}\": {reason}")]
    InvalidType { path: String, reason: String },

    #[error("\"{path}\": invalid default value \"{value}\": {reason}")]
    BadDefault {
        path: String,
        value: String,
        reason: String,
    },

    #[error("duplicate schema node \"{0}\"")]
    Duplicate(String),

    #[error("need to qualify type of {segment} in \"{path}\"")]
    NeedsQualification { segment: String, path: String },

    #[error("\"{0}\": wildcard node must declare a value type")]
    UntypedWildcard(String),

    #[error("\"{0}\": action has no target and no enclosing module declaration")]
    NoTargetModule(String),

    #[error("\"{path}\": variable {var} does not refer to any schema node")]
    UnresolvedVariable { path: String, var: String },

    #[error("module \"{0}\" is declared by more than one subtree")]
    DuplicateModule(String),

    #[error("\"{path}\": invalid {command} command: {reason}")]
    InvalidCommand {
        path: String,
        command: Lifecycle,
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDocument {
    #[serde(default)]
    node: Vec<NodeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeSpec {
    path: String,
    #[serde(rename = "type")]
    node_type: Option<String>,
    default: Option<toml::Value>,
    #[serde(default)]
    mandatory: Vec<String>,
    deprecated: Option<String>,
    help: Option<String>,
    #[serde(default)]
    commands: CommandsSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct CommandsSpec {
    create: Option<Vec<ActionSpec>>,
    delete: Option<Vec<ActionSpec>>,
    set: Option<Vec<ActionSpec>>,
    unset: Option<Vec<ActionSpec>>,
    get: Option<Vec<ActionSpec>>,
    default: Option<Vec<ActionSpec>>,
    activate: Option<Vec<ActionSpec>>,
    update: Option<Vec<ActionSpec>>,
    modinfo: Option<ModInfoSpec>,
    allow: Option<AllowSpec>,
    allow_range: Option<AllowRangeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActionSpec {
    target: Option<String>,
    request: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModInfoSpec {
    module: String,
    #[serde(default)]
    depends: Vec<String>,
    program: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AllowSpec {
    #[serde(default = "own_value")]
    variable: String,
    values: Vec<AllowedValueSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AllowedValueSpec {
    value: String,
    #[serde(default)]
    help: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AllowRangeSpec {
    #[serde(default = "own_value")]
    variable: String,
    ranges: Vec<AllowedRangeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AllowedRangeSpec {
    low: i64,
    high: i64,
    #[serde(default)]
    help: String,
}

fn own_value() -> String {
    "$(@)".to_string()
}

/// Load and compile a schema from a TOML file.
pub fn load_schema(path: &Path) -> Result<SchemaTree, SchemaError> {
    let content = fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_schema(&content)
}

/// Compile a schema from TOML source text.
pub fn parse_schema(content: &str) -> Result<SchemaTree, SchemaError> {
    let document: SchemaDocument = toml::from_str(content)?;
    let mut tree = SchemaTree::new();
    for spec in document.node {
        declare(&mut tree, spec)?;
    }
    expand(&mut tree)?;
    tracing::debug!(
        nodes = tree.len(),
        modules = tree.modules.len(),
        "schema compiled"
    );
    Ok(tree)
}

impl SchemaTree {
    pub fn from_toml_str(content: &str) -> Result<Self, SchemaError> {
        parse_schema(content)
    }
}

fn declare(tree: &mut SchemaTree, spec: NodeSpec) -> Result<(), SchemaError> {
    let segments: Vec<&str> = spec.path.split_whitespace().collect();
    let Some((last, init)) = segments.split_last() else {
        return Err(SchemaError::InvalidPath(spec.path.clone()));
    };

    let mut parent = tree.root();
    for raw in init {
        let (segname, qualifier) = split_qualifier(raw);
        let matches = tree.named_children(parent, segname, qualifier);
        parent = match matches.as_slice() {
            [] if segname == WILDCARD => {
                return Err(SchemaError::UntypedWildcard(spec.path.clone()));
            }
            [] => tree.push_child(parent, segname, qualifier.unwrap_or(NodeType::Void)),
            [only] => *only,
            _ => {
                return Err(SchemaError::NeedsQualification {
                    segment: segname.to_string(),
                    path: spec.path.clone(),
                })
            }
        };
    }

    let (segname, qualifier) = split_qualifier(last);
    let declared_type = spec
        .node_type
        .as_deref()
        .map(str::parse::<NodeType>)
        .transpose()
        .map_err(|e| SchemaError::InvalidType {
            path: spec.path.clone(),
            reason: e.to_string(),
        })?;
    let node_type = match (qualifier, declared_type) {
        (Some(q), Some(t)) if q != t => {
            return Err(SchemaError::InvalidType {
                path: spec.path.clone(),
                reason: format!("qualifier {q} contradicts declared type {t}"),
            })
        }
        (q, t) => q.or(t).unwrap_or(NodeType::Void),
    };
    if segname == WILDCARD && node_type == NodeType::Void {
        return Err(SchemaError::UntypedWildcard(spec.path.clone()));
    }

    let implicit = tree
        .named_children(parent, segname, None)
        .into_iter()
        .find(|c| !tree[*c].declared && tree[*c].node_type == NodeType::Void);
    let id = match implicit {
        Some(id) => {
            tree.node_mut(id).node_type = node_type;
            id
        }
        None => {
            if !tree.named_children(parent, segname, Some(node_type)).is_empty() {
                return Err(SchemaError::Duplicate(spec.path.clone()));
            }
            tree.push_child(parent, segname, node_type)
        }
    };

    let path = tree[id].path().to_string();
    let default = match spec.default {
        Some(value) => {
            let raw = match value {
                toml::Value::String(s) => s,
                other => other.to_string(),
            };
            let normalized = node_type.type_match(&raw).map_err(|e| SchemaError::BadDefault {
                path: path.clone(),
                value: raw.clone(),
                reason: e.0,
            })?;
            Some(normalized)
        }
        None => None,
    };
    let commands = compile_commands(&path, spec.commands)?;

    let node = tree.node_mut(id);
    node.declared = true;
    node.default = default;
    node.mandatory = spec.mandatory;
    node.deprecated = spec.deprecated;
    node.help = spec.help;
    node.commands = commands;
    Ok(())
}

fn compile_commands(path: &str, spec: CommandsSpec) -> Result<BTreeMap<Lifecycle, Command>, SchemaError> {
    let mut commands = BTreeMap::new();
    let action_lists = [
        (Lifecycle::Create, spec.create),
        (Lifecycle::Delete, spec.delete),
        (Lifecycle::Set, spec.set),
        (Lifecycle::Unset, spec.unset),
        (Lifecycle::Get, spec.get),
        (Lifecycle::Default, spec.default),
        (Lifecycle::Activate, spec.activate),
        (Lifecycle::Update, spec.update),
    ];
    for (lifecycle, actions) in action_lists {
        let Some(actions) = actions else { continue };
        let actions = actions
            .into_iter()
            .map(|a| ActionTemplate {
                target: match a.target {
                    Some(module) => ActionTarget::Module(module),
                    None => ActionTarget::Owner,
                },
                request: a.request,
            })
            .collect();
        commands.insert(lifecycle, Command::Actions(ActionCommand { lifecycle, actions }));
    }

    if let Some(info) = spec.modinfo {
        if info.module.is_empty() {
            return Err(SchemaError::InvalidCommand {
                path: path.to_string(),
                command: Lifecycle::ModInfo,
                reason: "module name is empty".into(),
            });
        }
        commands.insert(
            Lifecycle::ModInfo,
            Command::ModInfo(ModuleDescriptor {
                module: info.module,
                depends: info.depends,
                program: info.program,
            }),
        );
    }

    if let Some(allow) = spec.allow {
        if allow.values.is_empty() {
            return Err(SchemaError::InvalidCommand {
                path: path.to_string(),
                command: Lifecycle::Allow,
                reason: "no values listed".into(),
            });
        }
        commands.insert(
            Lifecycle::Allow,
            Command::Allow(AllowCommand {
                variable: allow.variable,
                values: allow
                    .values
                    .into_iter()
                    .map(|v| AllowedValue { value: v.value, help: v.help })
                    .collect(),
            }),
        );
    }

    if let Some(allow) = spec.allow_range {
        if let Some(bad) = allow.ranges.iter().find(|r| r.low > r.high) {
            return Err(SchemaError::InvalidCommand {
                path: path.to_string(),
                command: Lifecycle::AllowRange,
                reason: format!("range [{}..{}] is inverted", bad.low, bad.high),
            });
        }
        commands.insert(
            Lifecycle::AllowRange,
            Command::AllowRange(AllowRangeCommand {
                variable: allow.variable,
                ranges: allow
                    .ranges
                    .into_iter()
                    .map(|r| AllowedRange { low: r.low, high: r.high, help: r.help })
                    .collect(),
            }),
        );
    }
    Ok(commands)
}

/// Post-load pass: propagate module ownership, resolve deferred action
/// targets and check every variable reference.
fn expand(tree: &mut SchemaTree) -> Result<(), SchemaError> {
    let mut stack: Vec<(SchemaId, Option<String>)> = vec![(tree.root(), None)];
    while let Some((id, inherited)) = stack.pop() {
        let owner = match tree[id].modinfo() {
            Some(info) => {
                let module = info.module.clone();
                if tree.modules.insert(module.clone(), id).is_some() {
                    return Err(SchemaError::DuplicateModule(module));
                }
                Some(module)
            }
            None => inherited,
        };

        let path = tree[id].path().to_string();
        let node = tree.node_mut(id);
        node.module_name = owner.clone();
        for command in node.commands.values_mut() {
            let Command::Actions(cmd) = command else { continue };
            for action in &mut cmd.actions {
                if action.target == ActionTarget::Owner {
                    let module = owner.clone().ok_or_else(|| SchemaError::NoTargetModule(path.clone()))?;
                    action.target = ActionTarget::Module(module);
                }
            }
        }

        for child in tree[id].children().iter().rev() {
            stack.push((*child, owner.clone()));
        }
    }

    for id in tree.ids().collect::<Vec<_>>() {
        let node = &tree[id];
        let mut references: Vec<String> = node.mandatory.clone();
        for command in node.commands() {
            match command {
                Command::Actions(cmd) => {
                    for action in &cmd.actions {
                        references.extend(template_variables(&action.request).into_iter().map(String::from));
                    }
                }
                Command::Allow(guard) => references.push(guard.variable.clone()),
                Command::AllowRange(guard) => references.push(guard.variable.clone()),
                Command::ModInfo(_) => {}
            }
        }
        for var in references {
            if tree.find_varname_node(id, &var).is_none() {
                return Err(SchemaError::UnresolvedVariable {
                    path: node.path().to_string(),
                    var,
                });
            }
        }
    }
    Ok(())
}
