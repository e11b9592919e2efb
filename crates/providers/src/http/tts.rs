use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use echoai_config::ProviderEndpoint;
use echoai_core::{Error, ErrorKind, Result, TextToSpeech, VoiceConfig};

use super::{apply_auth, build_client, normalize_status, CLIENT_TIMEOUT};
use crate::normalize_transport_error;

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
    speaking_rate: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

/// Text-to-speech over a vendor HTTP endpoint. The response body is the
/// synthesized audio, opaque bytes passed through to the client.
pub struct HttpTtsProvider {
    name: String,
    url: String,
    endpoint: ProviderEndpoint,
    client: reqwest::Client,
}

impl HttpTtsProvider {
    pub fn new(endpoint: &ProviderEndpoint) -> Result<Self> {
        Ok(Self {
            name: endpoint.name.clone(),
            url: format!("{}/v1/synthesize", endpoint.endpoint.trim_end_matches('/')),
            endpoint: endpoint.clone(),
            client: build_client(&endpoint.name)?,
        })
    }
}

#[async_trait]
impl TextToSpeech for HttpTtsProvider {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>> {
        debug!(provider = %self.name, chars = text.len(), voice = %voice.voice_id, "synthesizing");

        let body = SynthesizeRequest {
            text,
            voice_id: &voice.voice_id,
            speaking_rate: voice.speaking_rate,
            model: self.endpoint.model.as_deref(),
        };

        let response = apply_auth(self.client.post(&self.url).json(&body), &self.endpoint)
            .send()
            .await
            .map_err(|e| normalize_transport_error(&self.name, CLIENT_TIMEOUT, e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(normalize_status(&self.name, status, detail));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| normalize_transport_error(&self.name, CLIENT_TIMEOUT, e))?;

        if audio.is_empty() {
            return Err(Error::Provider {
                provider: self.name.clone(),
                kind: ErrorKind::EmptyOutput,
                detail: "synthesis returned no audio".to_string(),
            });
        }
        Ok(audio.to_vec())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
