//! Conversation turns
//!
//! Turns are appended to a session's history in strict chronological order
//! and are immutable once complete. This ordering is the core correctness
//! invariant of the pipeline: two concurrent generations for one session
//! must never interleave their turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of the speaker in a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Turn lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Still being produced (audio buffering, provider calls in flight)
    Pending,
    /// Finalized; text/audio fields no longer change
    Complete,
    /// A provider chain was exhausted or the turn was cancelled
    Failed,
}

/// Reference to synthesized audio attached to a turn. The payload itself
/// streams over the transport; history keeps only the handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioHandle {
    pub id: Uuid,
    pub byte_len: usize,
}

impl AudioHandle {
    pub fn new(byte_len: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            byte_len,
        }
    }
}

/// A single turn in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: TurnRole,
    /// None until STT (user) or generation (assistant) completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// None for text-only turns and for user turns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioHandle>,
    pub timestamp: DateTime<Utc>,
    pub status: TurnStatus,
}

impl Turn {
    pub fn new(role: TurnRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: None,
            audio: None,
            timestamp: Utc::now(),
            status: TurnStatus::Pending,
        }
    }

    /// Completed user turn from a finalized transcript
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            status: TurnStatus::Complete,
            ..Self::new(TurnRole::User)
        }
    }

    /// Completed assistant turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            status: TurnStatus::Complete,
            ..Self::new(TurnRole::Assistant)
        }
    }

    /// Failed turn record. Failed turns are appended, never dropped.
    pub fn failed(role: TurnRole, text: Option<String>) -> Self {
        Self {
            text,
            status: TurnStatus::Failed,
            ..Self::new(role)
        }
    }

    pub fn with_audio(mut self, audio: AudioHandle) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TurnStatus::Complete | TurnStatus::Failed)
    }

    pub fn word_count(&self) -> usize {
        self.text
            .as_deref()
            .map(|t| t.split_whitespace().count())
            .unwrap_or(0)
    }
}
