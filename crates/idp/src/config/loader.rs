use std::path::Path;

use crate::config::schema::{Config, CONFIG_VERSION};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Checks the rules the schema cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.retry.backoff_factor < 1.0 {
        return Err(ConfigError::Validation {
            message: format!(
                "retry.backoff_factor must be at least 1.0 (got {})",
                config.retry.backoff_factor
            ),
        });
    }

    if config.processing.batch_size == 0 {
        return Err(ConfigError::Validation {
            message: "processing.batch_size must be at least 1".to_string(),
        });
    }

    if !(150..=400).contains(&config.processing.render_dpi) {
        return Err(ConfigError::Validation {
            message: format!(
                "processing.render_dpi must be between 150 and 400 (got {})",
                config.processing.render_dpi
            ),
        });
    }

    if config.queue.name == config.queue.dead_letter_name {
        return Err(ConfigError::Validation {
            message: "queue.dead_letter_name must differ from queue.name".to_string(),
        });
    }

    if config.storage.container == config.storage.processed_container {
        return Err(ConfigError::Validation {
            message: "storage.processed_container must differ from storage.container".to_string(),
        });
    }

    if config.backends.primary.name == config.backends.secondary.name {
        return Err(ConfigError::Validation {
            message: format!(
                "Backend names must be distinct (both are '{}')",
                config.backends.primary.name
            ),
        });
    }

    Ok(())
}
