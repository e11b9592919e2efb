//! Knowledge retrieval trait
//!
//! The retriever is an external collaborator consumed at its interface
//! boundary only. It is best-effort: a failed or slow retrieval degrades
//! the turn to empty context, it never fails the turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A ranked context snippet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub content: String,
    /// Relevance score, 0.0 - 1.0, highest first in result lists
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Snippet {
    pub fn new(content: impl Into<String>, score: f32) -> Self {
        Self {
            content: content.into(),
            score,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Knowledge retriever interface
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync + 'static {
    /// Retrieve up to `top_k` snippets relevant to `query`, best first.
    ///
    /// Errors map to `Error::RetrievalUnavailable` and are absorbed by the
    /// caller.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>>;

    /// Retriever identity for logging
    fn name(&self) -> &str;
}
