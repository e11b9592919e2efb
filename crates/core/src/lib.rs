//! Core traits and types for the EchoAI voice pipeline
//!
//! This crate provides foundational types used across all other crates:
//! - Provider trait seams (STT, LLM, TTS, knowledge retrieval)
//! - Audio chunk and utterance buffer types
//! - Conversation turns and session lifecycle states
//! - Provider attempt records for fallback decisions
//! - Error types

pub mod audio;
pub mod error;
pub mod provider;
pub mod session;
pub mod traits;
pub mod turn;

pub use audio::{AudioChunk, Utterance, UtteranceBuffer};
pub use error::{Error, ErrorKind, Result};
pub use provider::{Capability, ProviderResult};
pub use session::SessionState;
pub use turn::{AudioHandle, Turn, TurnRole, TurnStatus};

pub use traits::{
    // Speech
    SpeechToText, TextToSpeech, Transcript, VoiceConfig,
    // LLM
    GenerateRequest, LanguageModel, Message, Role,
    // Retrieval
    KnowledgeRetriever, Snippet,
};
