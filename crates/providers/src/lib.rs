//! Provider adapters, fallback chains, and the response cache
//!
//! This crate supplies everything between the conversation agent and the
//! outside world:
//! - `FallbackChain` - ordered, timeout-bounded provider attempts
//! - `ResponseCache` - LRU memoization of TTS output
//! - HTTP adapters for STT, LLM, TTS and the knowledge retriever

pub mod cache;
pub mod fallback;
pub mod http;

pub use cache::{normalize_text, ResponseCache};
pub use fallback::{ChainOutcome, FallbackChain};
pub use http::{HttpLlmProvider, HttpRetriever, HttpSttProvider, HttpTtsProvider};

use std::sync::Arc;
use std::time::Duration;

use echoai_config::ProvidersConfig;
use echoai_core::{
    Capability, Error, KnowledgeRetriever, LanguageModel, Result, SpeechToText, TextToSpeech,
};

/// All provider chains for one process, shared across sessions.
pub struct ProviderChains {
    pub stt: FallbackChain<dyn SpeechToText>,
    pub llm: FallbackChain<dyn LanguageModel>,
    pub tts: FallbackChain<dyn TextToSpeech>,
    pub retriever: Option<Arc<dyn KnowledgeRetriever>>,
}

impl ProviderChains {
    /// Build chains from settings, ordered primary-first as configured.
    pub fn from_settings(config: &ProvidersConfig) -> Result<Self> {
        let mut stt: FallbackChain<dyn SpeechToText> = FallbackChain::new(
            Capability::Stt,
            Duration::from_millis(config.stt_timeout_ms),
        );
        for ep in &config.stt {
            stt.push(ep.name.clone(), Arc::new(HttpSttProvider::new(ep)?));
        }

        let mut llm: FallbackChain<dyn LanguageModel> = FallbackChain::new(
            Capability::Llm,
            Duration::from_millis(config.llm_timeout_ms),
        );
        for ep in &config.llm {
            llm.push(ep.name.clone(), Arc::new(HttpLlmProvider::new(ep)?));
        }

        let mut tts: FallbackChain<dyn TextToSpeech> = FallbackChain::new(
            Capability::Tts,
            Duration::from_millis(config.tts_timeout_ms),
        );
        for ep in &config.tts {
            tts.push(ep.name.clone(), Arc::new(HttpTtsProvider::new(ep)?));
        }

        let retriever: Option<Arc<dyn KnowledgeRetriever>> = match &config.retriever.endpoint {
            Some(endpoint) => Some(Arc::new(HttpRetriever::new(
                endpoint,
                Duration::from_millis(config.retriever.timeout_ms),
            )?)),
            None => None,
        };

        Ok(Self {
            stt,
            llm,
            tts,
            retriever,
        })
    }
}

/// Map a reqwest failure into the shared taxonomy. Response bodies are kept
/// in the internal detail only.
pub(crate) fn normalize_transport_error(
    provider: &str,
    timeout: Duration,
    err: reqwest::Error,
) -> Error {
    if err.is_timeout() {
        Error::ProviderTimeout {
            provider: provider.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        Error::Provider {
            provider: provider.to_string(),
            kind: echoai_core::ErrorKind::Network,
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echoai_config::{ProviderEndpoint, ProvidersConfig, RetrieverConfig};

    fn endpoint(name: &str) -> ProviderEndpoint {
        ProviderEndpoint {
            name: name.to_string(),
            endpoint: format!("http://{name}.internal"),
            model: None,
            api_key: None,
        }
    }

    #[test]
    fn chains_build_from_settings() {
        let config = ProvidersConfig {
            stt: vec![endpoint("stt-a"), endpoint("stt-b")],
            llm: vec![endpoint("llm-a")],
            tts: vec![endpoint("tts-a")],
            retriever: RetrieverConfig {
                endpoint: Some("http://kb.internal".to_string()),
                ..RetrieverConfig::default()
            },
            ..ProvidersConfig::default()
        };

        let chains = ProviderChains::from_settings(&config).unwrap();
        assert_eq!(chains.stt.len(), 2);
        assert_eq!(chains.llm.len(), 1);
        assert_eq!(chains.tts.len(), 1);
        assert!(chains.retriever.is_some());
    }

    #[test]
    fn retriever_is_optional() {
        let chains = ProviderChains::from_settings(&ProvidersConfig::default()).unwrap();
        assert!(chains.stt.is_empty());
        assert!(chains.retriever.is_none());
    }
}
