use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use echoai_core::{Error, KnowledgeRetriever, Result, Snippet};

/// Name used in logs; the retriever is a single endpoint, not a chain.
const RETRIEVER_NAME: &str = "http-retriever";

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    snippets: Vec<Snippet>,
}

/// Knowledge retrieval over a vendor HTTP endpoint.
///
/// Every failure, transport or otherwise, collapses into
/// `Error::RetrievalUnavailable`: retrieval is best-effort and the caller
/// degrades to empty context rather than failing the turn.
pub struct HttpRetriever {
    url: String,
    client: reqwest::Client,
}

impl HttpRetriever {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::RetrievalUnavailable(format!("client build failed: {e}")))?;
        Ok(Self {
            url: format!("{}/v1/retrieve", endpoint.trim_end_matches('/')),
            client,
        })
    }
}

#[async_trait]
impl KnowledgeRetriever for HttpRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Snippet>> {
        debug!(top_k, "retrieving context");

        let response = self
            .client
            .post(&self.url)
            .json(&RetrieveRequest { query, top_k })
            .send()
            .await
            .map_err(|e| Error::RetrievalUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::RetrievalUnavailable(format!("status {status}")));
        }

        let mut parsed: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| Error::RetrievalUnavailable(e.to_string()))?;

        parsed.snippets.truncate(top_k);
        Ok(parsed.snippets)
    }

    fn name(&self) -> &str {
        RETRIEVER_NAME
    }
}
