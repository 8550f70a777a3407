//! Configuration validation
//!
//! Validates configuration values and ensures consistency

use thiserror::Error;

use crate::{CacheConfig, Config, ModelConfig, ObservabilityConfig};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid cache capacity: {0} (must be > 0)")]
    InvalidCacheCapacity(u64),

    #[error("Invalid cache TTL: {0} (must be > 0)")]
    InvalidCacheTTL(u64),

    #[error("Invalid log level: {0} (must be one of: trace, debug, info, warn, error)")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0} (must be one of: pretty, compact, json)")]
    InvalidLogFormat(String),

    #[error("Model definition not found: {0}")]
    MissingModelDefinition(String),

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Validation result type
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate complete configuration
pub fn validate(config: &Config) -> ValidationResult<()> {
    let mut errors: Vec<ValidationError> = [
        validate_cache(&config.cache),
        validate_model(&config.model),
        validate_observability(&config.observability),
    ]
    .into_iter()
    .filter_map(Result::err)
    .collect();

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

/// Validate cache configuration
pub fn validate_cache(config: &CacheConfig) -> ValidationResult<()> {
    if config.enabled {
        if config.max_capacity == 0 {
            return Err(ValidationError::InvalidCacheCapacity(config.max_capacity));
        }

        if config.ttl_seconds == 0 {
            return Err(ValidationError::InvalidCacheTTL(config.ttl_seconds));
        }
    }

    Ok(())
}

/// Validate model configuration
pub fn validate_model(config: &ModelConfig) -> ValidationResult<()> {
    match &config.definition_path {
        Some(path) if !path.is_file() => Err(ValidationError::MissingModelDefinition(
            path.display().to_string(),
        )),
        _ => Ok(()),
    }
}

/// Validate observability configuration
pub fn validate_observability(config: &ObservabilityConfig) -> ValidationResult<()> {
    match config.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(ValidationError::InvalidLogLevel(config.log_level.clone())),
    }

    match config.log_format.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("pretty") | Some("compact") | Some("json") => Ok(()),
        Some(other) => Err(ValidationError::InvalidLogFormat(other.to_string())),
    }
}
