//! Configuration management for the avatar agent
//!
//! Supports loading configuration from:
//! - YAML/TOML files
//! - Environment variables (AVATAR_AGENT_ prefix)
//! - Runtime overrides

pub mod settings;

pub use settings::{
    load_settings, EngineConfig, ObservabilityConfig, RelayConfig, ServerConfig, ServicesConfig,
    Settings, SynthesisConfig, TranscriptionConfig, GenerationConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
