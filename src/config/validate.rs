//! Whole-tree checks run before a commit touches any module.

use thiserror::Error;

use crate::config::tree::ConfigTree;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("\"{path}\" is deprecated: {reason}")]
    Deprecated { path: String, reason: String },

    #[error("\"{path}\" requires {variable} to be configured")]
    MissingMandatory { path: String, variable: String },

    #[error("bad value for \"{path}\": {reason}")]
    InvalidValue { path: String, reason: String },
}

impl ConfigTree {
    /// Reject deprecated nodes, unresolved mandatory references and values
    /// that no longer pass their type. Nodes marked deleted are skipped and
    /// cannot satisfy a mandatory reference.
    pub fn check_config_tree(&self) -> Result<(), CheckError> {
        let mut stack = self.children(self.root()).to_vec();
        while let Some(id) = stack.pop() {
            let node = &self[id];
            if node.deleted() {
                continue;
            }
            let schema = self.schema_node(id);
            if let Some(reason) = schema.deprecated() {
                return Err(CheckError::Deprecated {
                    path: node.path().to_string(),
                    reason: reason.to_string(),
                });
            }
            for variable in schema.mandatory() {
                if self.expand_live_variable(id, variable).is_none() {
                    return Err(CheckError::MissingMandatory {
                        path: node.path().to_string(),
                        variable: variable.clone(),
                    });
                }
            }
            if let Some(value) = node.value() {
                if !schema.is_wildcard() {
                    schema.type_match(value).map_err(|e| CheckError::InvalidValue {
                        path: node.path().to_string(),
                        reason: e.0,
                    })?;
                }
            }
            stack.extend(node.children().iter().rev().copied());
        }
        Ok(())
    }
}
