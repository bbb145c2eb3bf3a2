//! Retrieval and generation collaborators for parley
//!
//! The session core only sees the [`Retriever`] and [`Generator`] traits;
//! this crate also ships HTTP adapters for a search endpoint and an Ollama
//! server, plus the prompt rendering they share.

pub mod base;
pub mod http_retriever;
pub mod ollama;
pub mod prompt;

pub use base::{
    ContextWindow, Generator, Passage, ProviderError, ProviderResult, Retriever,
};
pub use http_retriever::HttpRetriever;
pub use ollama::OllamaGenerator;
pub use prompt::render_prompt;
