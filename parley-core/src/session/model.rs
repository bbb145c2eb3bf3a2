//! Session data structures

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Free-form context fields fixed at session creation (department, role, ...)
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used in rendered transcripts
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "Human",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message of a conversation, immutable once appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Passage identifiers that grounded this turn (empty for user turns)
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Turn {
    /// Create a user turn
    pub fn user(text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp,
            sources: Vec::new(),
        }
    }

    /// Create an assistant turn grounded on `sources`
    pub fn assistant(
        text: impl Into<String>,
        sources: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp,
            sources,
        }
    }

    /// `Human: ...` / `Assistant: ...`
    pub fn transcript_line(&self) -> String {
        format!("{}: {}", self.role.label(), self.text)
    }
}

/// Lifecycle state of a session
///
/// `Ended` and `Expired` are only ever observed in the active store while
/// the archive write is pending; `Archived` only appears on archive records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Active,
    Ended,
    Expired,
    Archived,
}

/// Why a session left the active store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    UserEnded,
    Expired,
}

impl TerminationReason {
    /// Pre-archive state entered for this reason
    pub fn state(&self) -> SessionState {
        match self {
            TerminationReason::UserEnded => SessionState::Ended,
            TerminationReason::Expired => SessionState::Expired,
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::UserEnded => write!(f, "user_ended"),
            TerminationReason::Expired => write!(f, "expired"),
        }
    }
}

/// A conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique identifier
    pub session_id: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Time of the last appended turn (or creation)
    pub last_active_at: DateTime<Utc>,
    /// Turns in chronological order
    #[serde(default)]
    pub turns: Vec<Turn>,
    /// Creation-time context fields
    #[serde(default)]
    pub metadata: Metadata,
    /// Lifecycle state
    pub state: SessionState,
}

impl Session {
    /// Create a new active session with the given id
    pub fn new(session_id: impl Into<String>, metadata: Metadata, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: now,
            last_active_at: now,
            turns: Vec::new(),
            metadata,
            state: SessionState::Active,
        }
    }

    /// Create a new active session under a freshly generated id
    pub fn generate(metadata: Metadata, now: DateTime<Utc>) -> Self {
        Self::new(Uuid::new_v4().to_string(), metadata, now)
    }

    /// Number of turns recorded
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Whether the session has been idle for longer than `expiry` at `now`
    pub fn is_idle_longer_than(&self, expiry: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_active_at > expiry
    }

    /// The last `max` turns, oldest first
    pub fn recent_turns(&self, max: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(max);
        &self.turns[start..]
    }

    /// Observability view of this session
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            last_active_at: self.last_active_at,
            turn_count: self.turn_count(),
        }
    }
}

/// Lightweight listing entry for an active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub turn_count: usize,
}
