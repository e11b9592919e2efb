//! Language model traits

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::traits::retriever::Snippet;
use crate::Result;

/// Role in a chat-style prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in the prompt history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Generation request assembled by the conversation agent: the finalized
/// transcript, retrieved context (possibly empty after a retrieval
/// failure), and a bounded window of prior turns.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Current user utterance text
    pub transcript: String,
    /// Ranked context snippets, best first
    pub context: Vec<Snippet>,
    /// Bounded sliding-window history, oldest first
    pub history: Vec<Message>,
}

impl GenerateRequest {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: Vec<Snippet>) -> Self {
        self.context = context;
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

/// Language model interface
///
/// # Example
///
/// ```ignore
/// let llm: Arc<dyn LanguageModel> = Arc::new(HttpLlmProvider::new(config)?);
/// let request = GenerateRequest::new("what are your opening hours?")
///     .with_context(snippets);
/// let reply = llm.generate(&request).await?;
/// ```
#[async_trait]
pub trait LanguageModel: Send + Sync + 'static {
    /// Generate the assistant's reply text.
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;

    /// Provider identity for logging and attempt records
    fn name(&self) -> &str;
}
