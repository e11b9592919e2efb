use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use echoai_config::ProviderEndpoint;
use echoai_core::{
    Error, ErrorKind, GenerateRequest, LanguageModel, Message, Result, Role,
};

use super::{apply_auth, build_client, normalize_status, CLIENT_TIMEOUT};
use crate::normalize_transport_error;

const SYSTEM_PROMPT: &str = "You are a helpful voice assistant. Answer concisely \
in a natural spoken register. Ground your answers in the provided context when \
it is relevant; otherwise answer from general knowledge.";

#[derive(Debug, Serialize)]
struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    text: String,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Chat-style language model over a vendor HTTP endpoint.
pub struct HttpLlmProvider {
    name: String,
    url: String,
    endpoint: ProviderEndpoint,
    client: reqwest::Client,
}

impl HttpLlmProvider {
    pub fn new(endpoint: &ProviderEndpoint) -> Result<Self> {
        Ok(Self {
            name: endpoint.name.clone(),
            url: format!("{}/v1/chat", endpoint.endpoint.trim_end_matches('/')),
            endpoint: endpoint.clone(),
            client: build_client(&endpoint.name)?,
        })
    }

    /// Flatten the agent's request into a chat message list: system prompt
    /// (with context snippets appended), then history oldest-first, then
    /// the current transcript as the final user message.
    fn build_messages(request: &GenerateRequest) -> Vec<ChatMessage> {
        let mut system = SYSTEM_PROMPT.to_string();
        if !request.context.is_empty() {
            system.push_str("\n\nContext:");
            for snippet in &request.context {
                system.push_str("\n- ");
                system.push_str(&snippet.content);
            }
        }

        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
        for Message { role, content } in &request.history {
            messages.push(ChatMessage {
                role: role_str(*role),
                content: content.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.transcript.clone(),
        });
        messages
    }
}

#[async_trait]
impl LanguageModel for HttpLlmProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        debug!(
            provider = %self.name,
            history = request.history.len(),
            snippets = request.context.len(),
            "generating response"
        );

        let body = ChatRequest {
            model: self.endpoint.model.clone(),
            messages: Self::build_messages(request),
            stream: false,
        };

        let response = apply_auth(self.client.post(&self.url).json(&body), &self.endpoint)
            .send()
            .await
            .map_err(|e| normalize_transport_error(&self.name, CLIENT_TIMEOUT, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(normalize_status(&self.name, status, body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| normalize_transport_error(&self.name, CLIENT_TIMEOUT, e))?;

        let text = parsed.text.trim().to_string();
        if text.is_empty() {
            return Err(Error::Provider {
                provider: self.name.clone(),
                kind: ErrorKind::EmptyOutput,
                detail: "model returned an empty response".to_string(),
            });
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
