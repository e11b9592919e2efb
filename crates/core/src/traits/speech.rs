//! Speech processing traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A finalized transcription result.
///
/// Partial transcripts are advisory and never cross this seam; adapters
/// return only final text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// 0.0 - 1.0; adapters without confidence report 1.0
    pub confidence: f32,
}

impl Transcript {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    /// Empty or whitespace-only transcripts short-circuit the turn: no
    /// generation or synthesis is attempted for silence.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Voice parameters for synthesis. Part of the response-cache key: a voice
/// change must never serve audio synthesized under different parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub voice_id: String,
    pub speaking_rate: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_id: "default".to_string(),
            speaking_rate: 1.0,
        }
    }
}

impl VoiceConfig {
    pub fn new(voice_id: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            speaking_rate: 1.0,
        }
    }

    /// Stable fragment for cache keys
    pub fn cache_tag(&self) -> String {
        format!("{}@{:.2}", self.voice_id, self.speaking_rate)
    }
}

/// Speech-to-Text interface
///
/// # Example
///
/// ```ignore
/// let stt: Arc<dyn SpeechToText> = Arc::new(HttpSttProvider::new(config)?);
/// let transcript = stt.transcribe(&utterance.audio).await?;
/// println!("heard: {}", transcript.text);
/// ```
#[async_trait]
pub trait SpeechToText: Send + Sync + 'static {
    /// Transcribe one complete utterance of opaque audio bytes.
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript>;

    /// Provider identity for logging and attempt records
    fn name(&self) -> &str;
}

/// Text-to-Speech interface
#[async_trait]
pub trait TextToSpeech: Send + Sync + 'static {
    /// Synthesize text to audio bytes.
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>>;

    /// Provider identity for logging and attempt records
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_transcripts() {
        assert!(Transcript::new("", 1.0).is_blank());
        assert!(Transcript::new("  \t\n", 0.2).is_blank());
        assert!(!Transcript::new("hello", 0.9).is_blank());
    }

    #[test]
    fn voice_cache_tag_reflects_parameters() {
        let a = VoiceConfig::new("aria");
        let mut b = VoiceConfig::new("aria");
        b.speaking_rate = 1.25;
        assert_ne!(a.cache_tag(), b.cache_tag());
    }
}
