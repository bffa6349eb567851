//! Settings loading from disk.

use std::fs;
use std::path::Path;

use crate::settings::schema::ManagerSettings;
use crate::settings::validation::{validate_settings, ValidationError};

/// Error type for settings loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse and validate settings from TOML text.
pub fn parse_settings(content: &str) -> Result<ManagerSettings, ConfigError> {
    let settings: ManagerSettings = toml::from_str(content).map_err(ConfigError::Parse)?;
    validate_settings(&settings).map_err(ConfigError::Validation)?;
    Ok(settings)
}

/// Load and validate settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<ManagerSettings, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_settings(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_surface() {
        let err = parse_settings("[commit]\naction_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().starts_with("Validation failed: commit.action_timeout_ms"));
    }

    #[test]
    fn test_unknown_syntax_is_parse_error() {
        let err = parse_settings("[commit\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_settings(Path::new("/nonexistent/router-manager.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
