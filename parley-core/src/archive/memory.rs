//! In-process archive sink

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{ArchiveRecord, ArchiveSink, ArchiveSummary, WriteOutcome};
use crate::{Error, Result};

/// Archive sink that keeps records in memory
///
/// Can be switched into a failing mode to exercise archive-failure paths.
#[derive(Debug, Default)]
pub struct MemoryArchiveSink {
    records: Mutex<HashMap<String, ArchiveRecord>>,
    failing: AtomicBool,
}

impl MemoryArchiveSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl ArchiveSink for MemoryArchiveSink {
    async fn write(&self, record: &ArchiveRecord) -> Result<WriteOutcome> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Archive("archive destination unavailable".to_string()));
        }

        let mut records = self.records.lock();
        if let Some(existing) = records.get(record.session_id()) {
            return Ok(WriteOutcome::AlreadyArchived(Box::new(existing.clone())));
        }
        records.insert(record.session_id().to_string(), record.clone());
        Ok(WriteOutcome::Written)
    }

    async fn read(&self, session_id: &str) -> Result<Option<ArchiveRecord>> {
        Ok(self.records.lock().get(session_id).cloned())
    }

    async fn list(&self) -> Result<Vec<ArchiveSummary>> {
        let mut summaries: Vec<ArchiveSummary> =
            self.records.lock().values().map(|r| r.summary()).collect();
        summaries.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        Ok(summaries)
    }
}
