//! HTTP-backed provider adapters
//!
//! One generic adapter per capability. Vendor wire formats beyond this
//! minimal JSON surface are out of scope; each adapter's job is to carry
//! the request and normalize failures into the shared taxonomy. Status
//! codes map 4xx to `RejectedInput` and 5xx to `BadResponse`; response
//! bodies stay in internal log detail and never reach clients.

mod llm;
mod retriever;
mod stt;
mod tts;

pub use llm::HttpLlmProvider;
pub use retriever::HttpRetriever;
pub use stt::HttpSttProvider;
pub use tts::HttpTtsProvider;

use std::time::Duration;

use echoai_config::ProviderEndpoint;
use echoai_core::{Error, ErrorKind, Result};

/// Client build timeout is generous; per-attempt deadlines are enforced by
/// the fallback chain.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) fn build_client(provider: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(CLIENT_TIMEOUT)
        .build()
        .map_err(|e| Error::Provider {
            provider: provider.to_string(),
            kind: ErrorKind::Network,
            detail: format!("failed to build HTTP client: {e}"),
        })
}

pub(crate) fn normalize_status(
    provider: &str,
    status: reqwest::StatusCode,
    body: String,
) -> Error {
    let kind = if status.is_client_error() {
        ErrorKind::RejectedInput
    } else {
        ErrorKind::BadResponse
    };
    Error::Provider {
        provider: provider.to_string(),
        kind,
        detail: format!("status {status}: {body}"),
    }
}

pub(crate) fn apply_auth(
    request: reqwest::RequestBuilder,
    endpoint: &ProviderEndpoint,
) -> reqwest::RequestBuilder {
    match &endpoint.api_key {
        Some(key) => request.bearer_auth(key),
        None => request,
    }
}
