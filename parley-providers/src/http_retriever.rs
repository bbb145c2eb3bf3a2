//! HTTP retrieval client
//!
//! Talks to a search service that accepts `{"query", "k"}` and answers with
//! either a bare list of passages or `{"passages": [...]}`.

use async_trait::async_trait;
use parley_core::config::RetrievalConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::base::{Passage, ProviderError, ProviderResult, Retriever};

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    k: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RetrieveResponse {
    List(Vec<Passage>),
    Wrapped { passages: Vec<Passage> },
}

/// Retriever backed by a remote search endpoint
pub struct HttpRetriever {
    client: Client,
    endpoint: String,
}

impl HttpRetriever {
    /// Create a client from the retrieval settings
    pub fn new(config: &RetrievalConfig) -> ProviderResult<Self> {
        if !config.is_enabled() {
            return Err(ProviderError::ConfigError(
                "retrieval.endpoint is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim().to_string(),
        })
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(&self, query: &str, k: usize) -> ProviderResult<Vec<Passage>> {
        debug!("Retrieving top {} passages from {}", k, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&RetrieveRequest { query, k })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::ApiError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        let mut passages = match serde_json::from_str::<RetrieveResponse>(&body) {
            Ok(RetrieveResponse::List(passages)) => passages,
            Ok(RetrieveResponse::Wrapped { passages }) => passages,
            Err(e) => {
                return Err(ProviderError::InvalidResponse(format!(
                    "unexpected retrieval payload: {}",
                    e
                )))
            }
        };
        passages.truncate(k);

        debug!("Retrieved {} passages", passages.len());
        Ok(passages)
    }
}
