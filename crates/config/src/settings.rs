//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent sessions; creation past this returns 503
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Allowed CORS origins; empty means localhost-only
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_max_sessions() -> usize {
    256
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_sessions: default_max_sessions(),
            cors_origins: Vec::new(),
            cors_enabled: true,
        }
    }
}

/// One provider endpoint in a fallback chain, ordered primary-first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    /// Identity used in logs and attempt records
    pub name: String,
    /// Base URL of the provider's HTTP API
    pub endpoint: String,
    /// Model/voice identifier passed through to the provider
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Provider chains and per-capability timeouts.
///
/// STT gets the shortest timeout because it blocks perceptible turn
/// latency most directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub stt: Vec<ProviderEndpoint>,
    #[serde(default)]
    pub llm: Vec<ProviderEndpoint>,
    #[serde(default)]
    pub tts: Vec<ProviderEndpoint>,

    #[serde(default = "default_stt_timeout_ms")]
    pub stt_timeout_ms: u64,
    #[serde(default = "default_llm_timeout_ms")]
    pub llm_timeout_ms: u64,
    #[serde(default = "default_tts_timeout_ms")]
    pub tts_timeout_ms: u64,

    #[serde(default)]
    pub retriever: RetrieverConfig,
}

fn default_stt_timeout_ms() -> u64 {
    3_000
}

fn default_llm_timeout_ms() -> u64 {
    15_000
}

fn default_tts_timeout_ms() -> u64 {
    10_000
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            stt: Vec::new(),
            llm: Vec::new(),
            tts: Vec::new(),
            stt_timeout_ms: default_stt_timeout_ms(),
            llm_timeout_ms: default_llm_timeout_ms(),
            tts_timeout_ms: default_tts_timeout_ms(),
            retriever: RetrieverConfig::default(),
        }
    }
}

/// Knowledge retriever endpoint (best-effort collaborator)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_retriever_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_top_k() -> usize {
    5
}

fn default_retriever_timeout_ms() -> u64 {
    1_500
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            top_k: default_top_k(),
            timeout_ms: default_retriever_timeout_ms(),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_capacity() -> usize {
    512
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

/// Session lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle sessions are evicted after this long without activity
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Disconnected sessions are kept this long for reconnection
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Cleanup sweep interval
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Sliding-window size of prior turns included in LLM prompts
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Pending-utterance queue depth per session
    #[serde(default = "default_utterance_queue")]
    pub utterance_queue: usize,

    /// Outbound event buffer per session; the agent suspends emission when
    /// it is full
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,

    /// Outbound audio chunk size in bytes
    #[serde(default = "default_audio_chunk_bytes")]
    pub audio_chunk_bytes: usize,
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_grace_period_secs() -> u64 {
    60
}

fn default_cleanup_interval_secs() -> u64 {
    30
}

fn default_history_window() -> usize {
    8
}

fn default_utterance_queue() -> usize {
    4
}

fn default_outbound_buffer() -> usize {
    64
}

fn default_audio_chunk_bytes() -> usize {
    32 * 1024
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            grace_period_secs: default_grace_period_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            history_window: default_history_window(),
            utterance_queue: default_utterance_queue(),
            outbound_buffer: default_outbound_buffer(),
            audio_chunk_bytes: default_audio_chunk_bytes(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-formatted logs (production)
    #[serde(default)]
    pub log_json: bool,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings, rejecting values that would break the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.history_window == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.history_window".to_string(),
                message: "history window must hold at least one turn".to_string(),
            });
        }

        if self.session.outbound_buffer == 0 || self.session.utterance_queue == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.outbound_buffer".to_string(),
                message: "session buffers must be non-zero".to_string(),
            });
        }

        if self.session.audio_chunk_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.audio_chunk_bytes".to_string(),
                message: "audio chunk size must be non-zero".to_string(),
            });
        }

        if self.cache.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.capacity".to_string(),
                message: "cache capacity must be non-zero".to_string(),
            });
        }

        for (field, timeout) in [
            ("providers.stt_timeout_ms", self.providers.stt_timeout_ms),
            ("providers.llm_timeout_ms", self.providers.llm_timeout_ms),
            ("providers.tts_timeout_ms", self.providers.tts_timeout_ms),
        ] {
            if !(100..=120_000).contains(&timeout) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("timeout must be 100..=120000 ms, got {}", timeout),
                });
            }
        }

        if self.environment.is_production() && self.providers.llm.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "providers.llm".to_string(),
                message: "production requires at least one LLM provider".to_string(),
            });
        }

        Ok(())
    }
}

/// Load settings with layered precedence:
/// env vars (`ECHOAI_*`) > `config/{env}.yaml` > `config/default.yaml` > defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder().add_source(File::with_name("config/default").required(false));

    if let Some(env) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env)).required(false));
    }

    let config = builder
        .add_source(Environment::with_prefix("ECHOAI").separator("__"))
        .build()?;

    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.providers.stt_timeout_ms < settings.providers.llm_timeout_ms);
    }

    #[test]
    fn zero_history_window_rejected() {
        let mut settings = Settings::default();
        settings.session.history_window = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn out_of_range_timeout_rejected() {
        let mut settings = Settings::default();
        settings.providers.stt_timeout_ms = 10;
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn production_requires_llm_providers() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        assert!(settings.validate().is_err());

        settings.providers.llm.push(ProviderEndpoint {
            name: "primary".into(),
            endpoint: "http://llm.internal".into(),
            model: Some("small-chat".into()),
            api_key: None,
        });
        assert!(settings.validate().is_ok());
    }
}
