//! `$(...)` variable expansion against the instance tree.

use thiserror::Error;

use crate::config::node::NodeId;
use crate::config::tree::ConfigTree;
use crate::template::tree::strip_var;
use crate::template::WILDCARD;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to expand variable \"{variable}\" associated with node \"{path}\"")]
pub struct ExpandError {
    pub variable: String,
    pub path: String,
}

impl ConfigTree {
    /// Resolve one `$(name)` reference as seen from node `at`.
    ///
    /// `$(@)` and `$(<segname>)` give the node's value, `$(<>)` its
    /// operator, `$(#)` its ordinal and `$(x.DEFAULT)` the schema default.
    /// Dotted names walk up to the ancestor named by the first part and
    /// descend from there; `@` matches the instance on the current path.
    pub fn expand_variable(&self, at: NodeId, varname: &str) -> Option<String> {
        self.lookup_variable(at, varname, false)
    }

    /// Like [`ConfigTree::expand_variable`], but nodes marked deleted are
    /// treated as absent.
    pub fn expand_live_variable(&self, at: NodeId, varname: &str) -> Option<String> {
        self.lookup_variable(at, varname, true)
    }

    fn lookup_variable(&self, at: NodeId, varname: &str, skip_deleted: bool) -> Option<String> {
        let name = strip_var(varname)?;
        let node = &self[at];
        match name {
            "@" => return self.value_or_default(at),
            "<>" => return Some(node.operator().token().to_string()),
            "#" => return Some(self.ordinal(at).to_string()),
            "DEFAULT" => return self.schema_node(at).default_value().map(str::to_string),
            _ => {}
        }

        let mut parts: Vec<&str> = name.split('.').collect();
        if parts.last() == Some(&"DEFAULT") {
            parts.pop();
            let target = format!("$({})", parts.join("."));
            let schema = self.schema();
            let id = schema.find_varname_node(self.schema_id(at), &target)?;
            return schema[id].default_value().map(str::to_string);
        }

        if parts.len() == 1 && parts[0] == node.segname() {
            return self.value_or_default(at);
        }

        let ancestors = self.ancestors(at);
        if parts[0] == WILDCARD {
            return self.find_child_value(at, &parts[1..], &ancestors, skip_deleted);
        }
        if parts.len() == 1 {
            if let Some(value) = self.find_child_value(at, &parts, &ancestors, skip_deleted) {
                return Some(value);
            }
        }
        for id in &ancestors {
            if self[*id].segname() == parts[0] {
                if let Some(value) = self.find_child_value(*id, &parts[1..], &ancestors, skip_deleted) {
                    return Some(value);
                }
            }
        }

        let schema = self.schema();
        let id = schema.find_varname_node(self.schema_id(at), varname)?;
        schema[id].default_value().map(str::to_string)
    }

    /// Evaluate a backquoted expression such as `` `~$(@)` `` (boolean
    /// negation) or a plain variable reference.
    pub fn expand_expression(&self, at: NodeId, expression: &str) -> Option<String> {
        let inner = expression
            .strip_prefix('`')
            .and_then(|e| e.strip_suffix('`'))
            .unwrap_or(expression)
            .trim();
        match inner.strip_prefix('~') {
            Some(var) => match self.expand_variable(at, var.trim())?.as_str() {
                "true" => Some("false".to_string()),
                "false" => Some("true".to_string()),
                _ => None,
            },
            None => self.expand_variable(at, inner),
        }
    }

    /// Expand every variable and expression in an action template.
    /// A backslash escapes the next character.
    pub fn expand_template(&self, at: NodeId, template: &str) -> Result<String, ExpandError> {
        let fail = |variable: &str| ExpandError {
            variable: variable.to_string(),
            path: self[at].path().to_string(),
        };
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(c) = rest.chars().next() {
            if c == '\\' {
                let mut chars = rest[1..].chars();
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
                rest = chars.as_str();
            } else if rest.starts_with("$(") {
                let end = rest.find(')').ok_or_else(|| fail(rest))?;
                let var = &rest[..=end];
                out.push_str(&self.expand_variable(at, var).ok_or_else(|| fail(var))?);
                rest = &rest[end + 1..];
            } else if c == '`' {
                let end = rest[1..].find('`').map(|i| i + 1).ok_or_else(|| fail(rest))?;
                let expression = &rest[..=end];
                out.push_str(&self.expand_expression(at, expression).ok_or_else(|| fail(expression))?);
                rest = &rest[end + 1..];
            } else {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
        Ok(out)
    }

    fn value_or_default(&self, id: NodeId) -> Option<String> {
        match self[id].value() {
            Some(value) => Some(value.to_string()),
            None => self.schema_node(id).default_value().map(str::to_string),
        }
    }

    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        let mut cursor = self[id].parent();
        while let Some(parent) = cursor {
            out.push(parent);
            cursor = self[parent].parent();
        }
        out
    }

    fn find_child_value(
        &self,
        from: NodeId,
        parts: &[&str],
        ancestors: &[NodeId],
        skip_deleted: bool,
    ) -> Option<String> {
        let Some((first, rest)) = parts.split_first() else {
            return self.value_or_default(from);
        };
        for child in self.children(from) {
            if skip_deleted && self[*child].deleted() {
                continue;
            }
            let matches = if *first == WILDCARD {
                self.schema_node(*child).is_wildcard() && ancestors.contains(child)
            } else {
                self[*child].segname() == *first
            };
            if matches {
                if let Some(value) = self.find_child_value(*child, rest, ancestors, skip_deleted) {
                    return Some(value);
                }
            }
        }
        if rest.is_empty() && *first != WILDCARD {
            let schema = self.schema();
            let child = schema
                .named_children(self.schema_id(from), first, None)
                .into_iter()
                .next()?;
            return schema[child].default_value().map(str::to_string);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::text::parse_config;
    use crate::template::parse_schema;

    const SCHEMA: &str = r#"
[[node]]
path = "interfaces interface @"
type = "txt"

[[node]]
path = "interfaces interface @ mtu"
type = "u32"
default = 1500

[[node]]
path = "interfaces interface @ speed"
type = "u32"

[[node]]
path = "interfaces interface @ disable"
type = "bool"
default = false
"#;

    fn tree(text: &str) -> crate::config::ConfigTree {
        parse_config(Arc::new(parse_schema(SCHEMA).unwrap()), text, 0).unwrap()
    }

    #[test]
    fn test_special_forms() {
        let t = tree("interfaces { interface eth0 { mtu 9000; } interface eth1 { speed 10; } }");
        let mtu = t.find("interfaces interface eth0 mtu").unwrap();
        assert_eq!(t.expand_variable(mtu, "$(@)").as_deref(), Some("9000"));
        assert_eq!(t.expand_variable(mtu, "$(mtu)").as_deref(), Some("9000"));
        assert_eq!(t.expand_variable(mtu, "$(<>)").as_deref(), Some("="));
        assert_eq!(t.expand_variable(mtu, "$(DEFAULT)").as_deref(), Some("1500"));
        let eth1 = t.find("interfaces interface eth1").unwrap();
        assert_eq!(t.expand_variable(eth1, "$(#)").as_deref(), Some("2"));
    }

    #[test]
    fn test_dotted_paths() {
        let t = tree("interfaces { interface eth0 { mtu 9000; } interface eth1 { speed 10; } }");
        let speed = t.find("interfaces interface eth1 speed").unwrap();
        assert_eq!(t.expand_variable(speed, "$(interface.@)").as_deref(), Some("eth1"));
        let eth1 = t.find("interfaces interface eth1").unwrap();
        assert_eq!(t.expand_variable(eth1, "$(@.speed)").as_deref(), Some("10"));
        // mtu is absent on eth1, so the schema default applies
        assert_eq!(t.expand_variable(eth1, "$(@.mtu)").as_deref(), Some("1500"));
        assert_eq!(t.expand_variable(speed, "$(interface.@.mtu.DEFAULT)").as_deref(), Some("1500"));
        assert_eq!(t.expand_variable(eth1, "$(@.nosuch)"), None);
    }

    #[test]
    fn test_template_expansion() {
        let t = tree("interfaces { interface eth0 { mtu 9000; disable true; } }");
        let mtu = t.find("interfaces interface eth0 mtu").unwrap();
        assert_eq!(
            t.expand_template(mtu, "set_mtu?ifname=$(interface.@)&mtu=$(@)").unwrap(),
            "set_mtu?ifname=eth0&mtu=9000"
        );
        let disable = t.find("interfaces interface eth0 disable").unwrap();
        assert_eq!(
            t.expand_template(disable, "set_enabled?enabled=`~$(@)`").unwrap(),
            "set_enabled?enabled=false"
        );
        assert_eq!(t.expand_template(mtu, "cost=\\$(@)").unwrap(), "cost=$(@)");

        let err = t.expand_template(mtu, "x=$(interface.@.speed)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to expand variable \"$(interface.@.speed)\" associated with node \"interfaces interface eth0 mtu\""
        );
    }
}
