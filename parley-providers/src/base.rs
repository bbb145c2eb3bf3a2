//! Collaborator traits and the context window handed to generation

use async_trait::async_trait;
use parley_core::session::Turn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for collaborator calls
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A retrieved passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Identifier of the source chunk or document
    pub source_id: String,
    pub text: String,
    /// Relevance score, higher is better
    pub score: f32,
}

impl Passage {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>, score: f32) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            score,
        }
    }
}

/// Bounded context for one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub session_id: String,
    /// The new user query
    pub query: String,
    /// Prior turns, oldest first
    pub history: Vec<Turn>,
    /// Ranked passages, best first
    pub passages: Vec<Passage>,
    /// Retrieval failed, timed out, or returned nothing
    #[serde(default)]
    pub retrieval_degraded: bool,
}

impl ContextWindow {
    /// Identifiers of the passages in this window, in rank order
    pub fn sources(&self) -> Vec<String> {
        self.passages.iter().map(|p| p.source_id.clone()).collect()
    }

    /// Whether any passage grounds this window
    pub fn is_grounded(&self) -> bool {
        !self.passages.is_empty()
    }
}

/// Ranked passage lookup
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` passages for `query`, best first
    async fn retrieve(&self, query: &str, k: usize) -> ProviderResult<Vec<Passage>>;
}

/// Text generation from a context window
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate the assistant's reply
    async fn generate(&self, window: &ContextWindow) -> ProviderResult<String>;

    /// Model identifier, for logs
    fn model(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_window_sources_follow_rank_order() {
        let window = ContextWindow {
            session_id: "s".into(),
            query: "q".into(),
            history: vec![Turn::user("earlier", Utc::now())],
            passages: vec![
                Passage::new("b.md#3", "beta", 0.9),
                Passage::new("a.md#1", "alpha", 0.8),
            ],
            retrieval_degraded: false,
        };
        assert_eq!(window.sources(), vec!["b.md#3", "a.md#1"]);
        assert!(window.is_grounded());
    }
}
