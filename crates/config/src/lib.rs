//! Configuration management for the EchoAI server
//!
//! Supports loading configuration from:
//! - YAML files (`config/default.yaml`, `config/{env}.yaml`)
//! - Environment variables (`ECHOAI_` prefix)
//! - Built-in defaults

pub mod settings;

pub use settings::{
    load_settings, CacheConfig, ObservabilityConfig, ProviderEndpoint, ProvidersConfig,
    RetrieverConfig, RuntimeEnvironment, ServerConfig, SessionConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
