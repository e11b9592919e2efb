//! Error taxonomy shared across the pipeline
//!
//! Provider adapters normalize vendor failures into this taxonomy at the
//! adapter boundary; vendor error bodies are never surfaced to clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::{Capability, ProviderResult};

/// Normalized failure kind, used by the fallback chain to record why a
/// provider attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Provider did not respond within the per-capability timeout
    Timeout,
    /// Provider responded with an error or malformed output
    BadResponse,
    /// Provider rejected the input (4xx-class failures)
    RejectedInput,
    /// Provider returned an empty/unusable result
    EmptyOutput,
    /// Transport-level failure reaching the provider
    Network,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::BadResponse => "bad_response",
            ErrorKind::RejectedInput => "rejected_input",
            ErrorKind::EmptyOutput => "empty_output",
            ErrorKind::Network => "network",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline errors
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A single provider attempt timed out. Absorbed by the fallback chain.
    #[error("provider '{provider}' timed out after {timeout_ms}ms")]
    ProviderTimeout { provider: String, timeout_ms: u64 },

    /// A single provider attempt failed. Absorbed by the fallback chain.
    #[error("provider '{provider}' failed: {kind}")]
    Provider {
        provider: String,
        kind: ErrorKind,
        /// Internal detail for logs. Never sent to clients.
        detail: String,
    },

    /// Every provider in a capability's chain failed.
    #[error("all {capability} providers exhausted after {} attempts", failures.len())]
    AllProvidersExhausted {
        capability: Capability,
        failures: Vec<ProviderResult>,
    },

    /// Inbound audio chunk violated the per-session sequence invariant.
    #[error("out-of-order audio chunk: expected seq {expected}, got {got}")]
    OutOfOrderChunk { expected: u64, got: u64 },

    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// Knowledge retriever failure. Non-fatal: generation degrades to
    /// empty context.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Malformed or out-of-contract transport message. Fatal to the
    /// connection, not to the session.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Session was closed or evicted while a turn was in flight.
    #[error("session closed")]
    SessionClosed,

    /// Internal channel between pipeline stages closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,
}

impl Error {
    /// Normalized kind for this error, when it maps to a provider attempt.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::ProviderTimeout { .. } => Some(ErrorKind::Timeout),
            Error::Provider { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// True when the fallback chain should advance to the next provider.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Error::ProviderTimeout { .. } | Error::Provider { .. })
    }

    /// Client-safe message. Provider internals are collapsed into a
    /// generic description.
    pub fn client_message(&self) -> String {
        match self {
            Error::AllProvidersExhausted { capability, .. } => {
                format!("the {} service is currently unavailable", capability)
            }
            Error::ProviderTimeout { .. } | Error::Provider { .. } => {
                "a backend service is currently unavailable".to_string()
            }
            Error::OutOfOrderChunk { .. } => "audio stream out of sequence".to_string(),
            Error::UnknownSession(_) => "unknown session".to_string(),
            Error::RetrievalUnavailable(_) => "knowledge retrieval unavailable".to_string(),
            Error::ProtocolViolation(_) => "protocol violation".to_string(),
            Error::SessionClosed => "session closed".to_string(),
            Error::ChannelClosed => "internal stream closed".to_string(),
        }
    }

    /// Stable error code for the wire protocol.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ProviderTimeout { .. } => "provider_timeout",
            Error::Provider { .. } => "provider_error",
            Error::AllProvidersExhausted { .. } => "all_providers_exhausted",
            Error::OutOfOrderChunk { .. } => "out_of_order_chunk",
            Error::UnknownSession(_) => "unknown_session",
            Error::RetrievalUnavailable(_) => "retrieval_unavailable",
            Error::ProtocolViolation(_) => "protocol_violation",
            Error::SessionClosed => "session_closed",
            Error::ChannelClosed => "channel_closed",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_failures_are_absorbable() {
        let timeout = Error::ProviderTimeout {
            provider: "stt-primary".into(),
            timeout_ms: 1500,
        };
        assert!(timeout.is_provider_failure());
        assert_eq!(timeout.kind(), Some(ErrorKind::Timeout));

        let exhausted = Error::AllProvidersExhausted {
            capability: Capability::Stt,
            failures: vec![],
        };
        assert!(!exhausted.is_provider_failure());
    }

    #[test]
    fn client_message_never_leaks_detail() {
        let err = Error::Provider {
            provider: "llm-primary".into(),
            kind: ErrorKind::BadResponse,
            detail: "upstream said: quota exceeded for key sk-123".into(),
        };
        assert!(!err.client_message().contains("sk-123"));
        assert_eq!(err.code(), "provider_error");
    }
}
