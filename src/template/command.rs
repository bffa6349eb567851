//! Lifecycle commands attached to schema nodes.

use std::fmt;

/// Lifecycle events a schema node can carry a command for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lifecycle {
    Create,
    Delete,
    Set,
    Unset,
    Get,
    Default,
    Activate,
    Update,
    ModInfo,
    Allow,
    AllowRange,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Create => "create",
            Lifecycle::Delete => "delete",
            Lifecycle::Set => "set",
            Lifecycle::Unset => "unset",
            Lifecycle::Get => "get",
            Lifecycle::Default => "default",
            Lifecycle::Activate => "activate",
            Lifecycle::Update => "update",
            Lifecycle::ModInfo => "modinfo",
            Lifecycle::Allow => "allow",
            Lifecycle::AllowRange => "allow-range",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.as_str())
    }
}

/// Which module an action is sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTarget {
    Module(String),
    /// The module owning the enclosing subtree; resolved after loading.
    Owner,
}

/// One RPC action, with `$(...)` placeholders still unexpanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTemplate {
    pub target: ActionTarget,
    pub request: String,
}

impl ActionTemplate {
    /// Target module name, once resolved.
    pub fn module(&self) -> Option<&str> {
        match &self.target {
            ActionTarget::Module(m) => Some(m),
            ActionTarget::Owner => None,
        }
    }
}

/// Ordered list of actions run for one lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCommand {
    pub lifecycle: Lifecycle,
    pub actions: Vec<ActionTemplate>,
}

impl ActionCommand {
    /// Modules that receive at least one action from this command.
    pub fn affected_modules(&self) -> Vec<&str> {
        let mut modules: Vec<&str> = Vec::new();
        for module in self.actions.iter().filter_map(ActionTemplate::module) {
            if !modules.contains(&module) {
                modules.push(module);
            }
        }
        modules
    }

    pub fn actions_for<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a ActionTemplate> + 'a {
        self.actions.iter().filter(move |a| a.module() == Some(module))
    }
}

/// Module metadata declared by a `modinfo` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub module: String,
    pub depends: Vec<String>,
    pub program: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedValue {
    pub value: String,
    pub help: String,
}

/// Guard restricting a variable to an enumerated set of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowCommand {
    pub variable: String,
    pub values: Vec<AllowedValue>,
}

impl AllowCommand {
    pub fn verify(&self, value: &str) -> Result<(), String> {
        if self.values.iter().any(|a| a.value == value) {
            return Ok(());
        }
        let names: Vec<&str> = self.values.iter().map(|a| a.value.as_str()).collect();
        match names.as_slice() {
            [only] => Err(format!("The only value allowed is {only}.")),
            _ => Err(format!("Allowed values are: {}.", join_with_and(&names))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedRange {
    pub low: i64,
    pub high: i64,
    pub help: String,
}

impl fmt::Display for AllowedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.low, self.high)
    }
}

/// Guard restricting a numeric variable to a set of inclusive ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowRangeCommand {
    pub variable: String,
    pub ranges: Vec<AllowedRange>,
}

impl AllowRangeCommand {
    /// A value passes if it falls inside any one range. Range values
    /// (`lo..hi`) must fit inside a single range.
    pub fn verify(&self, value: &str) -> Result<(), String> {
        let (lo, hi) = value.split_once("..").unwrap_or((value, value));
        let bounds = lo.parse::<i64>().ok().zip(hi.parse::<i64>().ok());
        if let Some((lo, hi)) = bounds {
            if self.ranges.iter().any(|r| r.low <= lo && hi <= r.high) {
                return Ok(());
            }
        }
        let names: Vec<String> = self.ranges.iter().map(ToString::to_string).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        match names.as_slice() {
            [only] => Err(format!("The only range allowed is {only}.")),
            _ => Err(format!("Allowed ranges are: {}.", join_with_and(&names))),
        }
    }
}

/// A command attached to a schema node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Actions(ActionCommand),
    ModInfo(ModuleDescriptor),
    Allow(AllowCommand),
    AllowRange(AllowRangeCommand),
}

impl Command {
    pub fn lifecycle(&self) -> Lifecycle {
        match self {
            Command::Actions(c) => c.lifecycle,
            Command::ModInfo(_) => Lifecycle::ModInfo,
            Command::Allow(_) => Lifecycle::Allow,
            Command::AllowRange(_) => Lifecycle::AllowRange,
        }
    }
}

/// Every `$(...)` reference inside an action template, in order.
pub fn template_variables(template: &str) -> Vec<&str> {
    let mut vars = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("$(") {
        let after = &rest[start..];
        match after.find(')') {
            Some(end) => {
                vars.push(&after[..=end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    vars
}

fn join_with_and(items: &[&str]) -> String {
    match items.split_last() {
        None => String::new(),
        Some((last, [])) => (*last).to_string(),
        Some((last, init)) => format!("{} and {}", init.join(", "), last),
    }
}
