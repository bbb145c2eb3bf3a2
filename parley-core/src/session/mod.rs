//! Session management for live conversations
//!
//! Sessions live in an [`ActiveSessionStore`] while they are in progress and
//! leave it exactly once, through the archive.

pub mod active;
pub mod model;
pub mod store;

pub use active::{ActiveSessionStore, Lookup};
pub use model::{
    Metadata, Role, Session, SessionState, SessionSummary, TerminationReason, Turn,
};
pub use store::{MemorySessionStore, SessionMutation, SessionStore};
