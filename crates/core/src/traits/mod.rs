//! Provider trait seams
//!
//! Each external capability (STT, LLM, TTS, knowledge retrieval) is
//! consumed through one of these traits. Vendor heterogeneity lives behind
//! the adapters; everything above sees one operation signature per
//! capability and the shared error taxonomy.

pub mod llm;
pub mod retriever;
pub mod speech;

pub use llm::{GenerateRequest, LanguageModel, Message, Role};
pub use retriever::{KnowledgeRetriever, Snippet};
pub use speech::{SpeechToText, TextToSpeech, Transcript, VoiceConfig};
