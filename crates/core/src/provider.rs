//! Provider capability and attempt-record types

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Capability a provider adapter implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Speech-to-text
    Stt,
    /// Response generation
    Llm,
    /// Text-to-speech
    Tts,
    /// Knowledge retrieval (best-effort collaborator)
    Retrieval,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Stt => "stt",
            Capability::Llm => "llm",
            Capability::Tts => "tts",
            Capability::Retrieval => "retrieval",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of one provider attempt, kept for fallback decisions and
/// surfaced inside `AllProvidersExhausted`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub capability: Capability,
    /// Provider identity as reported by the adapter
    pub provider: String,
    pub success: bool,
    pub latency_ms: u64,
    /// Normalized failure kind when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl ProviderResult {
    pub fn ok(capability: Capability, provider: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            capability,
            provider: provider.into(),
            success: true,
            latency_ms,
            error: None,
        }
    }

    pub fn failed(
        capability: Capability,
        provider: impl Into<String>,
        latency_ms: u64,
        kind: ErrorKind,
    ) -> Self {
        Self {
            capability,
            provider: provider.into(),
            success: false,
            latency_ms,
            error: Some(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_records_round_trip() {
        let rec = ProviderResult::failed(Capability::Stt, "whisper-edge", 412, ErrorKind::Timeout);
        let json = serde_json::to_string(&rec).unwrap();
        let back: ProviderResult = serde_json::from_str(&json).unwrap();
        assert!(!back.success);
        assert_eq!(back.error, Some(ErrorKind::Timeout));
        assert_eq!(back.capability, Capability::Stt);
    }
}
