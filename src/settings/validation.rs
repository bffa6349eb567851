//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, file modes sane)
//! - Check addresses and log levels parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ManagerSettings → Result<(), Vec<ValidationError>>
//! - Runs before settings are accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::settings::schema::ManagerSettings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_settings(settings: &ManagerSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.paths.schema_file.trim().is_empty() {
        errors.push(ValidationError::new("paths.schema_file", "must not be empty"));
    }
    if settings.paths.boot_file.trim().is_empty() {
        errors.push(ValidationError::new("paths.boot_file", "must not be empty"));
    }
    if settings.commit.action_timeout_ms == 0 {
        errors.push(ValidationError::new("commit.action_timeout_ms", "must be greater than zero"));
    }
    if settings.persistence.file_mode > 0o777 {
        errors.push(ValidationError::new(
            "persistence.file_mode",
            format!("{:o} is not a permission mode", settings.persistence.file_mode),
        ));
    } else if settings.persistence.file_mode & 0o002 != 0 {
        errors.push(ValidationError::new(
            "persistence.file_mode",
            "saved files must not be world-writable",
        ));
    }
    if !LOG_LEVELS.contains(&settings.observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level \"{}\"", settings.observability.log_level),
        ));
    }
    if settings.observability.metrics_enabled
        && settings.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("\"{}\" is not a socket address", settings.observability.metrics_address),
        ));
    }
    if settings.watcher.enabled && settings.watcher.poll_interval_secs == 0 {
        errors.push(ValidationError::new("watcher.poll_interval_secs", "must be greater than zero"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_settings(&ManagerSettings::default()).is_ok());
    }

    #[test]
    fn test_all_errors_reported() {
        let mut settings = ManagerSettings::default();
        settings.commit.action_timeout_ms = 0;
        settings.persistence.file_mode = 0o666;
        settings.observability.log_level = "loud".into();
        settings.observability.metrics_enabled = true;
        settings.observability.metrics_address = "nowhere".into();

        let errors = validate_settings(&settings).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "commit.action_timeout_ms",
                "persistence.file_mode",
                "observability.log_level",
                "observability.metrics_address",
            ]
        );
    }
}
