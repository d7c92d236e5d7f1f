//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

pub(crate) fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: AppConfig = toml::from_str(&content)?;

    // Relative document paths are resolved against the config file.
    if let Some(dir) = path.parent() {
        if config.definition_path.is_relative() {
            config.definition_path = dir.join(&config.definition_path);
        }
        if let Some(spec) = config.options.validator.api_spec.as_mut() {
            if spec.is_relative() {
                *spec = dir.join(&*spec);
            }
        }
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
