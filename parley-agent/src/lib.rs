//! Conversation orchestration for parley
//!
//! This crate provides context assembly, the session lifecycle manager,
//! the orchestration facade, and the background expiry sweep.

pub mod context;
pub mod facade;
pub mod lifecycle;
pub mod sweeper;

pub use context::ContextAssembler;
pub use facade::{EndResponse, Orchestrator, QueryResponse};
pub use lifecycle::{LifecycleManager, StartedTurn};
pub use sweeper::SweepService;
