//! Ollama completion client

use async_trait::async_trait;
use parley_core::config::GenerationConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::base::{ContextWindow, Generator, ProviderError, ProviderResult};
use crate::prompt::{render_prompt, trim_completion, STOP_SEQUENCES};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
    top_p: f32,
    stop: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Generator backed by an Ollama server's `/api/generate`
pub struct OllamaGenerator {
    client: Client,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

impl OllamaGenerator {
    /// Create a client from the generation settings
    pub fn new(config: &GenerationConfig) -> ProviderResult<Self> {
        let api_base = config.api_base.trim().trim_end_matches('/').to_string();
        if api_base.is_empty() {
            return Err(ProviderError::ConfigError(
                "generation.api_base is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, window: &ContextWindow) -> ProviderResult<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: render_prompt(window),
            stream: false,
            options: GenerateOptions {
                num_predict: self.max_tokens,
                temperature: self.temperature,
                top_p: self.top_p,
                stop: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
            },
        };

        debug!(
            "Sending generate request to {} with model {} ({} passages, {} history turns)",
            self.api_base,
            self.model,
            window.passages.len(),
            window.history.len()
        );

        let url = format!("{}/api/generate", self.api_base);
        let response = self.client.post(&url).json(&request).send().await?;

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

        let body: GenerateResponse = response.json().await?;
        let text = trim_completion(&body.response);
        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "model returned an empty completion".to_string(),
            ));
        }

        debug!("Generated {} chars", text.len());
        Ok(text)
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}
