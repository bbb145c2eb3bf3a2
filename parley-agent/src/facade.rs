//! Orchestration facade
//!
//! The single entry point for an API layer: query, end, and read-only views.

use parley_core::archive::{ArchiveRecord, ArchiveSink, ArchiveSummary, ArchiveWriter};
use parley_core::clock::Clock;
use parley_core::config::{Config, GenerationConfig};
use parley_core::session::{ActiveSessionStore, Metadata, Session, SessionSummary, Turn};
use parley_core::{Error, Result};
use parley_providers::{Generator, Retriever};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::context::ContextAssembler;
use crate::lifecycle::LifecycleManager;

/// Reply to a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub session_id: String,
    pub response: String,
    pub sources_count: usize,
    /// The session was created by this query
    pub new_session: bool,
}

/// Reply to an end request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndResponse {
    pub ended: bool,
    /// An archive record was written by this request
    pub archived: bool,
}

/// Composes the lifecycle manager with the generation collaborator
pub struct Orchestrator {
    lifecycle: Arc<LifecycleManager>,
    generator: Arc<dyn Generator>,
    generation_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        generator: Arc<dyn Generator>,
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            lifecycle,
            generator,
            generation_timeout: Duration::from_secs(generation.timeout_secs),
        }
    }

    /// Wire an orchestrator from configuration and collaborators, backed by
    /// an in-process session store
    pub fn from_config(
        config: &Config,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn ArchiveSink>,
        retriever: Option<Arc<dyn Retriever>>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let store = Arc::new(ActiveSessionStore::in_memory(clock.clone(), &config.sessions));
        let assembler = ContextAssembler::new(retriever, &config.context, &config.retrieval);
        let archiver = ArchiveWriter::new(sink, clock);
        let lifecycle = Arc::new(LifecycleManager::new(store, assembler, archiver));
        Self::new(lifecycle, generator, &config.generation)
    }

    /// The underlying lifecycle manager
    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    /// Answer a query, continuing `session_id` when it is live
    pub async fn query(&self, session_id: Option<&str>, text: &str) -> Result<QueryResponse> {
        self.query_with_metadata(session_id, text, Metadata::new())
            .await
    }

    /// Answer a query; `metadata` applies if a new session is created.
    ///
    /// An unknown, ended or expired id continues in a fresh session under a
    /// new id. A generation failure leaves the user turn recorded and
    /// surfaces as a retryable [`Error::Generation`].
    pub async fn query_with_metadata(
        &self,
        session_id: Option<&str>,
        text: &str,
        metadata: Metadata,
    ) -> Result<QueryResponse> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }

        let started = match self
            .lifecycle
            .start_or_continue(session_id, text, metadata.clone())
            .await
        {
            Err(e) if e.starts_new_session() => {
                info!("{}; continuing in a new session", e);
                self.lifecycle.start_or_continue(None, text, metadata).await?
            }
            other => other?,
        };

        let window = &started.window;
        let generated = tokio::time::timeout(
            self.generation_timeout,
            self.generator.generate(window),
        )
        .await;
        let response = match generated {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(
                    "Generation with {} failed for session {}: {}",
                    self.generator.model(),
                    started.session_id,
                    e
                );
                return Err(Error::Generation(e.to_string()));
            }
            Err(_) => {
                error!(
                    "Generation for session {} timed out after {}s",
                    started.session_id,
                    self.generation_timeout.as_secs()
                );
                return Err(Error::Generation(format!(
                    "timed out after {}s",
                    self.generation_timeout.as_secs()
                )));
            }
        };

        let sources = window.sources();
        let sources_count = sources.len();
        let turn = Turn::assistant(response.clone(), sources, self.lifecycle.clock().now());
        self.lifecycle
            .record_response(&started.session_id, turn)
            .await?;

        info!(
            "Answered query in session {} ({} sources{})",
            started.session_id,
            sources_count,
            if window.retrieval_degraded {
                ", retrieval degraded"
            } else {
                ""
            }
        );

        Ok(QueryResponse {
            session_id: started.session_id,
            response,
            sources_count,
            new_session: started.created,
        })
    }

    /// End a session. Idempotent: unknown or already archived ids succeed.
    pub async fn end_session(&self, session_id: &str) -> Result<EndResponse> {
        let record = self.lifecycle.end(session_id).await?;
        Ok(EndResponse {
            ended: true,
            archived: record.is_some(),
        })
    }

    /// Live sessions, most recently active first
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.lifecycle.list_active().await
    }

    /// Archived sessions, most recently archived first
    pub async fn list_archives(&self) -> Result<Vec<ArchiveSummary>> {
        self.lifecycle.archiver().list().await
    }

    /// One archived record
    pub async fn archive(&self, session_id: &str) -> Result<Option<ArchiveRecord>> {
        self.lifecycle.archiver().read(session_id).await
    }

    /// A live session, for inspection
    pub async fn session(&self, session_id: &str) -> Result<Option<Session>> {
        self.lifecycle.session(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::archive::MemoryArchiveSink;
    use parley_core::clock::ManualClock;
    use parley_providers::{ContextWindow, ProviderResult};

    struct EchoGenerator;

    #[async_trait::async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, window: &ContextWindow) -> ProviderResult<String> {
            Ok(format!("echo: {}", window.query))
        }

        fn model(&self) -> String {
            "echo".to_string()
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::from_config(
            &Config::default(),
            Arc::new(ManualClock::default()),
            Arc::new(MemoryArchiveSink::new()),
            None,
            Arc::new(EchoGenerator),
        )
    }

    #[tokio::test]
    async fn test_query_creates_then_continues() {
        let orchestrator = orchestrator();
        let first = orchestrator.query(None, "  Hello  ").await.unwrap();
        assert!(first.new_session);
        assert_eq!(first.response, "echo: Hello");
        assert_eq!(first.sources_count, 0);

        let second = orchestrator
            .query(Some(&first.session_id), "More")
            .await
            .unwrap();
        assert!(!second.new_session);
        assert_eq!(second.session_id, first.session_id);

        let session = orchestrator.session(&first.session_id).await.unwrap().unwrap();
        assert_eq!(session.turn_count(), 4);
    }

    #[tokio::test]
    async fn test_blank_query_is_validation_error() {
        let err = orchestrator().query(None, " \n ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unknown_id_starts_new_session() {
        let response = orchestrator()
            .query(Some("no-such-session"), "Hi")
            .await
            .unwrap();
        assert!(response.new_session);
        assert_ne!(response.session_id, "no-such-session");
    }

    #[tokio::test]
    async fn test_expired_sessions_do_not_hold_capacity() {
        let mut config = Config::default();
        config.sessions.expiry_seconds = 60;
        config.sessions.max_active = 1;
        let clock = Arc::new(ManualClock::default());
        let sink = Arc::new(MemoryArchiveSink::new());
        let orchestrator = Orchestrator::from_config(
            &config,
            clock.clone(),
            sink.clone(),
            None,
            Arc::new(EchoGenerator),
        );

        let first = orchestrator.query(None, "Hello").await.unwrap();
        clock.advance(chrono::Duration::seconds(61));
        assert!(orchestrator.list_sessions().await.unwrap().is_empty());

        let second = orchestrator.query(None, "new user").await.unwrap();
        assert!(second.new_session);
        assert_ne!(second.session_id, first.session_id);
        assert_eq!(sink.len(), 1);
        assert!(orchestrator.archive(&first.session_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_metadata_lands_on_new_session() {
        let orchestrator = orchestrator();
        let mut metadata = Metadata::new();
        metadata.insert("department".into(), serde_json::json!("sales"));

        let response = orchestrator
            .query_with_metadata(None, "Hi", metadata)
            .await
            .unwrap();
        let session = orchestrator
            .session(&response.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.metadata["department"], "sales");
    }
}
