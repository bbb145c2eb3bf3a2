//! Durable archive of finished sessions
//!
//! A session leaves the active store exactly once, as an [`ArchiveRecord`]
//! written through an [`ArchiveSink`]. Records are keyed by session id and
//! never rewritten once stored.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::clock::Clock;
use crate::session::{Session, SessionState, TerminationReason};
use crate::{Error, Result};

pub use file::FileArchiveSink;
pub use memory::MemoryArchiveSink;

/// Immutable terminal record of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    /// The session as it was at termination, with state `Archived`
    #[serde(flatten)]
    pub session: Session,
    /// Why the session ended
    pub terminated_reason: TerminationReason,
    /// When the session was terminated
    pub ended_at: DateTime<Utc>,
    /// When the record was written
    pub archived_at: DateTime<Utc>,
}

impl ArchiveRecord {
    /// Build a record from a terminated session
    pub fn new(mut session: Session, reason: TerminationReason, now: DateTime<Utc>) -> Self {
        session.state = SessionState::Archived;
        Self {
            session,
            terminated_reason: reason,
            ended_at: now,
            archived_at: now,
        }
    }

    /// Id of the archived session
    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    /// Listing view of this record
    pub fn summary(&self) -> ArchiveSummary {
        ArchiveSummary {
            session_id: self.session.session_id.clone(),
            terminated_reason: self.terminated_reason,
            created_at: self.session.created_at,
            archived_at: self.archived_at,
            turn_count: self.session.turn_count(),
        }
    }

    /// Plain-text transcript, one `Human:`/`Assistant:` line per turn
    pub fn transcript(&self) -> String {
        self.session
            .turns
            .iter()
            .map(|turn| turn.transcript_line())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Lightweight listing entry for an archived session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub session_id: String,
    pub terminated_reason: TerminationReason,
    pub created_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
    pub turn_count: usize,
}

/// Result of handing a record to a sink
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The record is now stored
    Written,
    /// A record for this session id already existed and was left untouched
    AlreadyArchived(Box<ArchiveRecord>),
}

/// Durable, write-once destination for archive records
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Store a record unless one already exists for its session id.
    ///
    /// Must never leave a partially written record behind, including when
    /// several writers race on the same id.
    async fn write(&self, record: &ArchiveRecord) -> Result<WriteOutcome>;

    /// Read the record stored for a session
    async fn read(&self, session_id: &str) -> Result<Option<ArchiveRecord>>;

    /// Summaries of every stored record, most recently archived first
    async fn list(&self) -> Result<Vec<ArchiveSummary>>;
}

/// A stored record and whether the call that returned it wrote it
#[derive(Debug, Clone, PartialEq)]
pub struct Archived {
    pub record: ArchiveRecord,
    /// False when an earlier attempt had already stored the record
    pub written: bool,
}

/// Turns terminated sessions into archive records
#[derive(Clone)]
pub struct ArchiveWriter {
    sink: Arc<dyn ArchiveSink>,
    clock: Arc<dyn Clock>,
}

impl ArchiveWriter {
    /// Create a writer over `sink`
    pub fn new(sink: Arc<dyn ArchiveSink>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    /// Archive a session. Returns the stored record, which is the earlier
    /// one if this session was already archived.
    ///
    /// Sink failures surface as [`Error::Archive`].
    pub async fn archive(&self, session: Session, reason: TerminationReason) -> Result<Archived> {
        let record = ArchiveRecord::new(session, reason, self.clock.now());
        let session_id = record.session_id().to_string();

        match self.sink.write(&record).await {
            Ok(WriteOutcome::Written) => {
                info!(
                    "Archived session {} ({}, {} turns)",
                    session_id,
                    reason,
                    record.session.turn_count()
                );
                Ok(Archived {
                    record,
                    written: true,
                })
            }
            Ok(WriteOutcome::AlreadyArchived(existing)) => {
                info!("Session {} was already archived", session_id);
                Ok(Archived {
                    record: *existing,
                    written: false,
                })
            }
            Err(e) => {
                error!("Failed to archive session {}: {}", session_id, e);
                Err(match e {
                    Error::Archive(msg) => Error::Archive(msg),
                    other => Error::Archive(other.to_string()),
                })
            }
        }
    }

    /// Read one archived record
    pub async fn read(&self, session_id: &str) -> Result<Option<ArchiveRecord>> {
        self.sink.read(session_id).await
    }

    /// List archived sessions
    pub async fn list(&self) -> Result<Vec<ArchiveSummary>> {
        self.sink.list().await
    }
}
