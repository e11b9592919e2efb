use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use echoai_config::ProviderEndpoint;
use echoai_core::{Result, SpeechToText, Transcript};

use super::{apply_auth, build_client, normalize_status, CLIENT_TIMEOUT};
use crate::normalize_transport_error;

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
    /// Vendors without confidence scoring omit this; treat as certain.
    #[serde(default = "default_confidence")]
    confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

/// Speech-to-text over a vendor HTTP endpoint. Audio goes up as a raw
/// octet-stream body; the response carries the transcript text and an
/// optional confidence.
pub struct HttpSttProvider {
    name: String,
    url: String,
    endpoint: ProviderEndpoint,
    client: reqwest::Client,
}

impl HttpSttProvider {
    pub fn new(endpoint: &ProviderEndpoint) -> Result<Self> {
        Ok(Self {
            name: endpoint.name.clone(),
            url: format!("{}/v1/transcribe", endpoint.endpoint.trim_end_matches('/')),
            endpoint: endpoint.clone(),
            client: build_client(&endpoint.name)?,
        })
    }
}

#[async_trait]
impl SpeechToText for HttpSttProvider {
    async fn transcribe(&self, audio: &[u8]) -> Result<Transcript> {
        debug!(provider = %self.name, bytes = audio.len(), "transcribing utterance");

        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio.to_vec());
        if let Some(model) = &self.endpoint.model {
            request = request.query(&[("model", model.as_str())]);
        }

        let response = apply_auth(request, &self.endpoint)
            .send()
            .await
            .map_err(|e| normalize_transport_error(&self.name, CLIENT_TIMEOUT, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(normalize_status(&self.name, status, body));
        }

        let parsed: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| normalize_transport_error(&self.name, CLIENT_TIMEOUT, e))?;

        // An empty transcript is a valid outcome (silence); the agent
        // decides whether to short-circuit the turn.
        Ok(Transcript::new(parsed.text, parsed.confidence))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
