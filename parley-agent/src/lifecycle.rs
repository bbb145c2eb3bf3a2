//! Session lifecycle management
//!
//! Owns session identity and the `ACTIVE -> ENDED | EXPIRED -> ARCHIVED`
//! transitions. A terminating session is frozen in the active store first,
//! archived, and only then removed, so a failed archive write leaves it in
//! place for the next `end` or sweep to retry.

use parley_core::archive::{ArchiveRecord, ArchiveWriter};
use parley_core::clock::Clock;
use parley_core::session::{
    ActiveSessionStore, Lookup, Metadata, Session, SessionState, SessionSummary,
    TerminationReason, Turn,
};
use parley_core::{Error, Result};
use parley_providers::ContextWindow;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::ContextAssembler;

/// Outcome of opening a turn
#[derive(Debug, Clone)]
pub struct StartedTurn {
    pub session_id: String,
    /// Context for generation; its history excludes the new query
    pub window: ContextWindow,
    /// Session snapshot including the recorded user turn
    pub session: Session,
    /// Whether the session was created by this call
    pub created: bool,
}

/// Drives sessions through their lifecycle
pub struct LifecycleManager {
    store: Arc<ActiveSessionStore>,
    assembler: ContextAssembler,
    archiver: ArchiveWriter,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<ActiveSessionStore>,
        assembler: ContextAssembler,
        archiver: ArchiveWriter,
    ) -> Self {
        Self {
            store,
            assembler,
            archiver,
        }
    }

    /// Clock shared with the active store
    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.store.clock()
    }

    /// The archive this manager writes to
    pub fn archiver(&self) -> &ArchiveWriter {
        &self.archiver
    }

    /// Resolve or create a session, record the user's query as a turn, and
    /// assemble the context window for it.
    ///
    /// When the store is full, expired sessions are archived to make room
    /// before creation is retried once.
    ///
    /// An unknown or terminating id yields [`Error::SessionNotFound`]. An id
    /// found idle past the expiry window is archived on the spot and yields
    /// [`Error::SessionExpired`]; the query is not recorded on it.
    pub async fn start_or_continue(
        &self,
        session_id: Option<&str>,
        query: &str,
        metadata: Metadata,
    ) -> Result<StartedTurn> {
        let (session, created) = match self
            .store
            .get_or_create(session_id, metadata.clone())
            .await
        {
            Err(Error::SessionExpired(id)) => return Err(self.expire(id).await),
            Err(Error::CapacityExceeded(limit)) => {
                // Expired sessions still hold slots until they are archived.
                info!(
                    "Active session limit ({}) reached; archiving expired sessions",
                    limit
                );
                self.sweep_expired().await?;
                self.store.get_or_create(session_id, metadata).await?
            }
            other => other?,
        };
        if created {
            info!("Started session {}", session.session_id);
        }

        let turn = Turn::user(query, self.clock().now());
        let recorded = match self.store.append_turn(&session.session_id, turn).await {
            Err(Error::SessionExpired(id)) => return Err(self.expire(id).await),
            other => other?,
        };

        let mut prior = recorded.clone();
        prior.turns.pop();
        let window = self.assembler.assemble(&prior, query).await;

        Ok(StartedTurn {
            session_id: recorded.session_id.clone(),
            window,
            session: recorded,
            created,
        })
    }

    /// Archive a session discovered expired; returns the error to surface
    async fn expire(&self, session_id: String) -> Error {
        info!("Session {} expired on access", session_id);
        if let Err(e) = self.terminate(&session_id, TerminationReason::Expired).await {
            warn!(
                "Archiving expired session {} failed, will retry on sweep: {}",
                session_id, e
            );
        }
        Error::SessionExpired(session_id)
    }

    /// Append a generated turn to a live session
    pub async fn record_response(&self, session_id: &str, turn: Turn) -> Result<()> {
        self.store.append_turn(session_id, turn).await?;
        debug!("Recorded response for session {}", session_id);
        Ok(())
    }

    /// End a session at the caller's request.
    ///
    /// Returns the record written by this call, or `None` when the id is
    /// unknown or was archived by an earlier or concurrent call. An archive
    /// failure leaves the session in place, pending, and is reported as
    /// [`Error::Archive`].
    pub async fn end(&self, session_id: &str) -> Result<Option<ArchiveRecord>> {
        self.terminate(session_id, TerminationReason::UserEnded).await
    }

    /// Archive every expired session, retrying any left pending by an
    /// earlier failure. Failures are logged and left for the next sweep.
    pub async fn sweep_expired(&self) -> Result<Vec<ArchiveRecord>> {
        let candidates = self.store.expired_ids().await?;
        let mut archived = Vec::new();

        for session_id in candidates {
            match self.terminate(&session_id, TerminationReason::Expired).await {
                Ok(Some(record)) => archived.push(record),
                Ok(None) => {}
                Err(e) => warn!("Sweep could not archive session {}: {}", session_id, e),
            }
        }

        self.store.purge().await?;
        if !archived.is_empty() {
            info!("Sweep archived {} expired sessions", archived.len());
        }
        Ok(archived)
    }

    async fn terminate(
        &self,
        session_id: &str,
        reason: TerminationReason,
    ) -> Result<Option<ArchiveRecord>> {
        let Some(session) = self.store.begin_termination(session_id, reason).await? else {
            debug!("Session {} is not in the active store", session_id);
            return Ok(None);
        };

        let reason = match session.state {
            SessionState::Ended => TerminationReason::UserEnded,
            SessionState::Expired => TerminationReason::Expired,
            SessionState::Active | SessionState::Archived => return Ok(None),
        };

        let archived = self.archiver.archive(session, reason).await?;
        self.store.remove(session_id).await?;
        if !archived.written {
            return Ok(None);
        }
        info!("Session {} archived ({})", session_id, reason);
        Ok(Some(archived.record))
    }

    /// A live session, for inspection
    pub async fn session(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(match self.store.lookup(session_id).await? {
            Lookup::Live(session) => Some(session),
            _ => None,
        })
    }

    /// Summaries of live sessions
    pub async fn list_active(&self) -> Result<Vec<SessionSummary>> {
        self.store.list_active().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parley_core::archive::MemoryArchiveSink;
    use parley_core::clock::ManualClock;
    use parley_core::config::{ContextConfig, RetrievalConfig, SessionsConfig};

    struct Fixture {
        lifecycle: LifecycleManager,
        clock: Arc<ManualClock>,
        sink: Arc<MemoryArchiveSink>,
    }

    fn fixture() -> Fixture {
        fixture_with(SessionsConfig {
            expiry_seconds: 60,
            ..SessionsConfig::default()
        })
    }

    fn fixture_with(sessions: SessionsConfig) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(ActiveSessionStore::in_memory(clock.clone(), &sessions));
        let sink = Arc::new(MemoryArchiveSink::new());
        let lifecycle = LifecycleManager::new(
            store,
            ContextAssembler::new(None, &ContextConfig::default(), &RetrievalConfig::default()),
            ArchiveWriter::new(sink.clone(), clock.clone()),
        );
        Fixture {
            lifecycle,
            clock,
            sink,
        }
    }

    #[tokio::test]
    async fn test_start_records_user_turn_and_excludes_it_from_history() {
        let f = fixture();
        let first = f
            .lifecycle
            .start_or_continue(None, "Hello", Metadata::new())
            .await
            .unwrap();
        assert!(first.created);
        assert!(first.window.history.is_empty());
        assert_eq!(first.session.turn_count(), 1);

        let second = f
            .lifecycle
            .start_or_continue(Some(&first.session_id), "Tell me more", Metadata::new())
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.window.history.len(), 1);
        assert_eq!(second.window.history[0].text, "Hello");
        assert_eq!(second.window.query, "Tell me more");
    }

    #[tokio::test]
    async fn test_end_archives_once() {
        let f = fixture();
        let started = f
            .lifecycle
            .start_or_continue(None, "Hello", Metadata::new())
            .await
            .unwrap();

        let record = f.lifecycle.end(&started.session_id).await.unwrap().unwrap();
        assert_eq!(record.terminated_reason, TerminationReason::UserEnded);
        assert_eq!(record.session.state, SessionState::Archived);
        assert!(f.lifecycle.end(&started.session_id).await.unwrap().is_none());
        assert!(f.lifecycle.end("never-existed").await.unwrap().is_none());
        assert_eq!(f.sink.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_archive_keeps_session_pending_for_retry() {
        let f = fixture();
        let started = f
            .lifecycle
            .start_or_continue(None, "Hello", Metadata::new())
            .await
            .unwrap();

        f.sink.set_failing(true);
        let err = f.lifecycle.end(&started.session_id).await.unwrap_err();
        assert!(matches!(err, Error::Archive(_)));

        // Frozen: no longer usable, not yet archived.
        let err = f
            .lifecycle
            .start_or_continue(Some(&started.session_id), "again", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
        assert!(f.sink.is_empty());

        f.sink.set_failing(false);
        let swept = f.lifecycle.sweep_expired().await.unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].terminated_reason, TerminationReason::UserEnded);
        assert_eq!(swept[0].session.turn_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_access_archives_without_recording_query() {
        let f = fixture();
        let started = f
            .lifecycle
            .start_or_continue(None, "Hello", Metadata::new())
            .await
            .unwrap();

        f.clock.advance(Duration::seconds(61));
        let err = f
            .lifecycle
            .start_or_continue(Some(&started.session_id), "late", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionExpired(_)));

        let record = f
            .lifecycle
            .archiver()
            .read(&started.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.terminated_reason, TerminationReason::Expired);
        assert_eq!(record.session.turn_count(), 1);
        assert!(f.lifecycle.session(&started.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_only_takes_expired_sessions() {
        let f = fixture();
        let old = f
            .lifecycle
            .start_or_continue(None, "old", Metadata::new())
            .await
            .unwrap();
        f.clock.advance(Duration::seconds(45));
        let fresh = f
            .lifecycle
            .start_or_continue(None, "fresh", Metadata::new())
            .await
            .unwrap();
        f.clock.advance(Duration::seconds(30));

        let swept = f.lifecycle.sweep_expired().await.unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].session_id(), old.session_id);

        let active = f.lifecycle.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, fresh.session_id);
        assert!(f.lifecycle.sweep_expired().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_store_archives_expired_sessions_to_make_room() {
        let f = fixture_with(SessionsConfig {
            expiry_seconds: 60,
            max_active: 1,
            ..SessionsConfig::default()
        });
        let old = f
            .lifecycle
            .start_or_continue(None, "first user", Metadata::new())
            .await
            .unwrap();

        f.clock.advance(Duration::seconds(61));
        assert!(f.lifecycle.list_active().await.unwrap().is_empty());

        let fresh = f
            .lifecycle
            .start_or_continue(None, "new user", Metadata::new())
            .await
            .unwrap();
        assert!(fresh.created);

        let record = f.lifecycle.archiver().read(&old.session_id).await.unwrap().unwrap();
        assert_eq!(record.terminated_reason, TerminationReason::Expired);
        assert_eq!(record.session.turn_count(), 1);
    }

    #[tokio::test]
    async fn test_full_store_of_live_sessions_still_refuses() {
        let f = fixture_with(SessionsConfig {
            expiry_seconds: 60,
            max_active: 1,
            ..SessionsConfig::default()
        });
        f.lifecycle
            .start_or_continue(None, "first user", Metadata::new())
            .await
            .unwrap();

        f.clock.advance(Duration::seconds(30));
        let err = f
            .lifecycle
            .start_or_continue(None, "second user", Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(1)));
        assert!(err.is_retryable());
        assert!(f.sink.is_empty());
    }
}
