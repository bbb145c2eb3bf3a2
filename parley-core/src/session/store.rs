//! Backing store for live sessions
//!
//! [`SessionStore`] is the capability set an active-session backend must
//! offer: put-with-ttl, get, atomic per-key update, touch, delete and list.
//! The TTL is the physical retention of an entry; whether a session is
//! logically expired is decided one layer up from its `last_active_at`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::model::Session;
use crate::clock::Clock;
use crate::{Error, Result};

/// Read-modify-write applied under the per-key lock.
///
/// Returns `Ok(true)` to commit the change (and refresh the TTL), `Ok(false)`
/// to leave the entry untouched. An error discards the change.
pub type SessionMutation = Box<dyn FnOnce(&mut Session) -> Result<bool> + Send>;

/// Keyed, TTL-bounded storage of live sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a new session. Fails if a live entry with the same id exists
    /// or the store is at capacity.
    async fn insert(&self, session: Session, ttl: Duration) -> Result<()>;

    /// Fetch a copy of a session
    async fn get(&self, session_id: &str) -> Result<Option<Session>>;

    /// Atomically mutate a session; `None` if absent.
    ///
    /// Concurrent updates of the same id are serialized; updates of
    /// distinct ids do not contend.
    async fn update(
        &self,
        session_id: &str,
        ttl: Duration,
        mutation: SessionMutation,
    ) -> Result<Option<Session>>;

    /// Extend the retention of an entry; `false` if absent
    async fn touch(&self, session_id: &str, ttl: Duration) -> Result<bool>;

    /// Remove and return a session; `None` if already gone
    async fn delete(&self, session_id: &str) -> Result<Option<Session>>;

    /// Copies of every stored session
    async fn list(&self) -> Result<Vec<Session>>;

    /// Drop entries past their retention; returns how many were dropped
    async fn purge(&self) -> Result<usize>;
}

#[derive(Debug)]
struct Slot {
    session: Option<Session>,
    expires_at: DateTime<Utc>,
}

impl Slot {
    fn live(&self, now: DateTime<Utc>) -> Option<&Session> {
        self.session.as_ref().filter(|_| self.expires_at > now)
    }
}

/// In-process session store
///
/// The map lock is only held to find or replace a slot; all session work
/// happens under the slot's own mutex. A deleted slot is emptied under its
/// mutex, so an updater still holding the old slot sees it as absent.
pub struct MemorySessionStore {
    clock: Arc<dyn Clock>,
    capacity: usize,
    slots: RwLock<HashMap<String, Arc<Mutex<Slot>>>>,
}

impl MemorySessionStore {
    /// Create an unbounded store
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            capacity: 0,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Limit the number of stored sessions (0 for unbounded)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    fn slot(&self, session_id: &str) -> Option<Arc<Mutex<Slot>>> {
        self.slots.read().get(session_id).cloned()
    }

    /// Drop `slot` from the map if it is still the one registered for `session_id`
    fn evict(&self, session_id: &str, slot: &Arc<Mutex<Slot>>) {
        let mut slots = self.slots.write();
        if slots
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            slots.remove(session_id);
            debug!("Evicted lapsed session entry: {}", session_id);
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: Session, ttl: Duration) -> Result<()> {
        let now = self.clock.now();
        let mut slots = self.slots.write();

        if let Some(existing) = slots.get(&session.session_id) {
            if existing.lock().live(now).is_some() {
                return Err(Error::Internal(format!(
                    "session {} already exists",
                    session.session_id
                )));
            }
        }

        if self.capacity > 0 && slots.len() >= self.capacity {
            slots.retain(|_, slot| slot.lock().live(now).is_some());
            if slots.len() >= self.capacity {
                return Err(Error::CapacityExceeded(self.capacity));
            }
        }

        let id = session.session_id.clone();
        slots.insert(
            id,
            Arc::new(Mutex::new(Slot {
                session: Some(session),
                expires_at: now + ttl,
            })),
        );
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let Some(slot) = self.slot(session_id) else {
            return Ok(None);
        };
        let now = self.clock.now();
        let found = slot.lock().live(now).cloned();
        if found.is_none() {
            self.evict(session_id, &slot);
        }
        Ok(found)
    }

    async fn update(
        &self,
        session_id: &str,
        ttl: Duration,
        mutation: SessionMutation,
    ) -> Result<Option<Session>> {
        let Some(slot) = self.slot(session_id) else {
            return Ok(None);
        };

        let outcome = {
            let mut guard = slot.lock();
            let now = self.clock.now();
            match guard.live(now).cloned() {
                None => None,
                Some(mut draft) => {
                    if mutation(&mut draft)? {
                        guard.session = Some(draft.clone());
                        guard.expires_at = now + ttl;
                        Some(draft)
                    } else {
                        guard.session.clone()
                    }
                }
            }
        };

        if outcome.is_none() {
            self.evict(session_id, &slot);
        }
        Ok(outcome)
    }

    async fn touch(&self, session_id: &str, ttl: Duration) -> Result<bool> {
        let Some(slot) = self.slot(session_id) else {
            return Ok(false);
        };
        let mut guard = slot.lock();
        let now = self.clock.now();
        if guard.live(now).is_none() {
            return Ok(false);
        }
        guard.expires_at = now + ttl;
        Ok(true)
    }

    async fn delete(&self, session_id: &str) -> Result<Option<Session>> {
        let removed = self.slots.write().remove(session_id);
        let Some(slot) = removed else {
            return Ok(None);
        };
        let now = self.clock.now();
        let mut guard = slot.lock();
        let live = guard.live(now).is_some();
        let session = guard.session.take();
        Ok(session.filter(|_| live))
    }

    async fn list(&self) -> Result<Vec<Session>> {
        let slots: Vec<Arc<Mutex<Slot>>> = self.slots.read().values().cloned().collect();
        let now = self.clock.now();
        Ok(slots
            .iter()
            .filter_map(|slot| slot.lock().live(now).cloned())
            .collect())
    }

    async fn purge(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|_, slot| slot.lock().live(now).is_some());
        let dropped = before - slots.len();
        if dropped > 0 {
            debug!("Purged {} lapsed session entries", dropped);
        }
        Ok(dropped)
    }
}
