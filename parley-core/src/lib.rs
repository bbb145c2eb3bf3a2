//! Core types and stores for parley
//!
//! This crate provides the session data model, the TTL-bounded active
//! session store, the archive writer, and the shared configuration,
//! logging and error plumbing used by the other parley crates.

pub mod archive;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
