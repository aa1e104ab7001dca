//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, LoadError> {
    let content = fs::read_to_string(path)?;
    from_toml_str(&content)
}

/// Parse and validate configuration text.
pub fn from_toml_str(content: &str) -> Result<AppConfig, LoadError> {
    let config: AppConfig = toml::from_str(content)?;
    validate_config(&config).map_err(LoadError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogFormat;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = from_toml_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(config.errors.envelope);
        assert!(!config.versioning.strict);
        assert_eq!(config.limits.max_body_size, 2 * 1024 * 1024);
    }

    #[test]
    fn test_partial_sections() {
        let config = from_toml_str(
            r#"
            [versioning]
            strict = true

            [errors]
            envelope = false

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert!(config.versioning.strict);
        assert_eq!(config.versioning.header, "X-API-Version");
        assert!(!config.errors.envelope);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_parse_and_validation_errors() {
        assert!(matches!(from_toml_str("[listener"), Err(LoadError::Parse(_))));

        let err = from_toml_str("[listener]\nbind_address = \"oops\"").unwrap_err();
        assert!(matches!(err, LoadError::Validation(ref e) if e.len() == 1));
        assert!(err.to_string().contains("listener.bind_address"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }
}
