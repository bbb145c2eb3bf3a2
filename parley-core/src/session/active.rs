//! Active session store
//!
//! Wraps a [`SessionStore`] backend with the clock and the expiry window.
//! Expiry is checked lazily on every access, inside the backend's per-key
//! critical section, so a turn can never land on a session that has just
//! expired or is being archived.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use super::model::{Metadata, Session, SessionState, SessionSummary, TerminationReason, Turn};
use super::store::{MemorySessionStore, SessionStore};
use crate::clock::Clock;
use crate::config::SessionsConfig;
use crate::{Error, Result};

/// Result of looking a session up without mutating it
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Active and within its expiry window
    Live(Session),
    /// Active on paper but idle past the expiry window
    Expired(Session),
    /// Ended or expired, waiting for its archive write
    Terminating(Session),
    /// Not in the store
    Missing,
}

/// The keyed, TTL-bounded store of in-progress conversations
pub struct ActiveSessionStore {
    backend: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    expiry: Duration,
    retention: Duration,
}

impl ActiveSessionStore {
    /// Create a store over an arbitrary backend
    pub fn new(backend: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, config: &SessionsConfig) -> Self {
        Self {
            backend,
            clock,
            expiry: config.expiry(),
            retention: config.retention(),
        }
    }

    /// Create a store over a fresh in-process backend
    pub fn in_memory(clock: Arc<dyn Clock>, config: &SessionsConfig) -> Self {
        let backend =
            Arc::new(MemorySessionStore::new(clock.clone()).with_capacity(config.max_active));
        Self::new(backend, clock, config)
    }

    /// Idle time after which a session expires
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// The clock this store judges expiry with
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn classify(&self, session: Session) -> Lookup {
        match session.state {
            SessionState::Active if session.is_idle_longer_than(self.expiry, self.clock.now()) => {
                Lookup::Expired(session)
            }
            SessionState::Active => Lookup::Live(session),
            _ => Lookup::Terminating(session),
        }
    }

    /// Look a session up and classify it
    pub async fn lookup(&self, session_id: &str) -> Result<Lookup> {
        Ok(match self.backend.get(session_id).await? {
            Some(session) => self.classify(session),
            None => Lookup::Missing,
        })
    }

    /// Resume an existing session or, when no id is given, start a new one.
    ///
    /// Returns the session and whether it was created by this call.
    pub async fn get_or_create(
        &self,
        session_id: Option<&str>,
        metadata: Metadata,
    ) -> Result<(Session, bool)> {
        match session_id {
            Some(id) => Ok((self.get(id).await?, false)),
            None => {
                let session = Session::generate(metadata, self.clock.now());
                self.backend
                    .insert(session.clone(), self.retention)
                    .await?;
                debug!("Created session {}", session.session_id);
                Ok((session, true))
            }
        }
    }

    /// Fetch a live session
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        match self.lookup(session_id).await? {
            Lookup::Live(session) => Ok(session),
            Lookup::Expired(_) => Err(Error::SessionExpired(session_id.to_string())),
            Lookup::Terminating(_) | Lookup::Missing => {
                Err(Error::SessionNotFound(session_id.to_string()))
            }
        }
    }

    /// Append a turn and refresh the session's activity time and TTL.
    ///
    /// The clock is read under the session's lock; `last_active_at` never
    /// moves backwards.
    pub async fn append_turn(&self, session_id: &str, turn: Turn) -> Result<Session> {
        let id = session_id.to_string();
        let expiry = self.expiry;
        let clock = Arc::clone(&self.clock);

        let updated = self
            .backend
            .update(
                session_id,
                self.retention,
                Box::new(move |session| {
                    let now = clock.now();
                    if session.state != SessionState::Active {
                        return Err(Error::SessionNotFound(id));
                    }
                    if session.is_idle_longer_than(expiry, now) {
                        return Err(Error::SessionExpired(id));
                    }
                    session.turns.push(turn);
                    session.last_active_at = session.last_active_at.max(now);
                    Ok(true)
                }),
            )
            .await?;

        updated.ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    /// Freeze a session ahead of archiving it.
    ///
    /// An active session moves to `Ended` (or `Expired` if it is already
    /// idle past the window, whatever the requested reason). A session that
    /// is already terminating is returned unchanged so its archive write can
    /// be retried. When `reason` is `Expired` and the session turns out to be
    /// live, it is returned still `Active` and must not be archived.
    pub async fn begin_termination(
        &self,
        session_id: &str,
        reason: TerminationReason,
    ) -> Result<Option<Session>> {
        let expiry = self.expiry;
        let now = self.clock.now();

        self.backend
            .update(
                session_id,
                self.retention,
                Box::new(move |session| {
                    if session.state != SessionState::Active {
                        return Ok(false);
                    }
                    let expired = session.is_idle_longer_than(expiry, now);
                    session.state = match (reason, expired) {
                        (_, true) => SessionState::Expired,
                        (TerminationReason::UserEnded, false) => SessionState::Ended,
                        (TerminationReason::Expired, false) => return Ok(false),
                    };
                    Ok(true)
                }),
            )
            .await
    }

    /// Delete a session; `None` if it was already removed
    pub async fn remove(&self, session_id: &str) -> Result<Option<Session>> {
        let removed = self.backend.delete(session_id).await?;
        if removed.is_some() {
            debug!("Removed session {} from the active store", session_id);
        }
        Ok(removed)
    }

    /// Live sessions, most recently active first
    pub async fn list_active(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries: Vec<SessionSummary> = self
            .backend
            .list()
            .await?
            .into_iter()
            .filter_map(|session| match self.classify(session) {
                Lookup::Live(session) => Some(session.summary()),
                _ => None,
            })
            .collect();
        summaries.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        Ok(summaries)
    }

    /// Reclaim backend entries past their retention
    pub async fn purge(&self) -> Result<usize> {
        self.backend.purge().await
    }

    /// Number of sessions held by the backend, including ones pending archival
    pub async fn len(&self) -> Result<usize> {
        Ok(self.backend.list().await?.len())
    }

    /// Ids of sessions that are expired or stuck waiting for their archive write
    pub async fn expired_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .backend
            .list()
            .await?
            .into_iter()
            .filter_map(|session| match self.classify(session) {
                Lookup::Expired(session) | Lookup::Terminating(session) => {
                    Some(session.session_id)
                }
                _ => None,
            })
            .collect())
    }
}
