//! Filesystem archive sink

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ArchiveRecord, ArchiveSink, ArchiveSummary, WriteOutcome};
use crate::utils::safe_filename;
use crate::{Error, Result};

const RECORD_EXTENSION: &str = "json";

/// Archive sink writing one pretty-printed JSON file per session
///
/// Records are staged in a uniquely named temp file and hard-linked into
/// place. Linking fails if the target exists, so the first complete record
/// for an id wins and readers never observe a partial file.
#[derive(Debug, Clone)]
pub struct FileArchiveSink {
    dir: PathBuf,
}

impl FileArchiveSink {
    /// Create a sink rooted at `dir`; the directory is created on first write
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Archive directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `session_id`
    pub fn record_path(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", safe_filename(session_id), RECORD_EXTENSION))
    }

    async fn load(&self, path: &Path) -> Result<Option<ArchiveRecord>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read the record at `path`, checking it belongs to `session_id`
    async fn existing(&self, path: &Path, session_id: &str) -> Result<WriteOutcome> {
        match self.load(path).await? {
            Some(existing) if existing.session_id() == session_id => {
                Ok(WriteOutcome::AlreadyArchived(Box::new(existing)))
            }
            Some(existing) => Err(Error::Archive(format!(
                "archive file {:?} already holds session {}",
                path,
                existing.session_id()
            ))),
            None => Err(Error::Archive(format!(
                "archive file {:?} vanished while being read",
                path
            ))),
        }
    }

    async fn stage(&self, record: &ArchiveRecord) -> Result<PathBuf> {
        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            safe_filename(record.session_id()),
            Uuid::new_v4()
        ));
        let content = serde_json::to_string_pretty(record)?;

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        Ok(tmp)
    }
}

#[async_trait]
impl ArchiveSink for FileArchiveSink {
    async fn write(&self, record: &ArchiveRecord) -> Result<WriteOutcome> {
        let session_id = record.session_id();
        let target = self.record_path(session_id);

        if tokio::fs::try_exists(&target).await? {
            return self.existing(&target, session_id).await;
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.stage(record).await?;
        let linked = tokio::fs::hard_link(&tmp, &target).await;

        if let Err(e) = tokio::fs::remove_file(&tmp).await {
            warn!("Failed to remove staged archive file {:?}: {}", tmp, e);
        }

        match linked {
            Ok(()) => {
                debug!("Wrote archive record {:?}", target);
                Ok(WriteOutcome::Written)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                self.existing(&target, session_id).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, session_id: &str) -> Result<Option<ArchiveRecord>> {
        let record = self.load(&self.record_path(session_id)).await?;
        Ok(record.filter(|r| r.session_id() == session_id))
    }

    async fn list(&self) -> Result<Vec<ArchiveSummary>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
                && !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'));
            if !is_record {
                continue;
            }

            match self.load(&path).await {
                Ok(Some(record)) => summaries.push(record.summary()),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable archive file {:?}: {}", path, e),
            }
        }

        summaries.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Metadata, Session, SessionState, TerminationReason, Turn};
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(id: &str, turns: usize) -> ArchiveRecord {
        let now = Utc::now();
        let mut metadata = Metadata::new();
        metadata.insert("department".into(), serde_json::json!("finance"));
        let mut session = Session::new(id, metadata, now);
        for i in 0..turns {
            session.turns.push(Turn::user(format!("question {}", i), now));
            session.turns.push(Turn::assistant(
                format!("answer {}", i),
                vec![format!("doc-{}", i)],
                now,
            ));
        }
        ArchiveRecord::new(session, TerminationReason::UserEnded, now)
    }

    #[tokio::test]
    async fn test_write_then_read_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileArchiveSink::new(temp_dir.path().join("archives"));
        let original = record("7f1c", 3);

        assert_eq!(sink.write(&original).await.unwrap(), WriteOutcome::Written);
        let loaded = sink.read("7f1c").await.unwrap().unwrap();

        assert_eq!(loaded, original);
        assert_eq!(loaded.session.state, SessionState::Archived);
        assert_eq!(loaded.session.metadata["department"], "finance");
        assert_eq!(loaded.session.turns[5].sources, vec!["doc-2".to_string()]);
    }

    #[tokio::test]
    async fn test_second_write_keeps_first_record() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileArchiveSink::new(temp_dir.path());
        let first = record("dup", 2);
        sink.write(&first).await.unwrap();

        let second = record("dup", 1);
        match sink.write(&second).await.unwrap() {
            WriteOutcome::AlreadyArchived(existing) => assert_eq!(*existing, first),
            other => panic!("expected AlreadyArchived, got {:?}", other),
        }
        assert_eq!(sink.read("dup").await.unwrap().unwrap(), first);
    }

    #[tokio::test]
    async fn test_no_staging_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileArchiveSink::new(temp_dir.path());
        sink.write(&record("a", 1)).await.unwrap();
        sink.write(&record("a", 1)).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.json".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_store_one_record() {
        let temp_dir = TempDir::new().unwrap();
        let sink = Arc::new(FileArchiveSink::new(temp_dir.path()));

        let mut handles = Vec::new();
        for turns in 1..=8 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                sink.write(&record("race", turns)).await
            }));
        }

        let mut written = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == WriteOutcome::Written {
                written += 1;
            }
        }
        assert_eq!(written, 1);

        let stored = sink.read("race").await.unwrap().unwrap();
        assert_eq!(sink.list().await.unwrap().len(), 1);
        assert_eq!(stored.session.turn_count() % 2, 0);
    }

    #[tokio::test]
    async fn test_list_sorted_and_skips_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileArchiveSink::new(temp_dir.path());

        let mut older = record("older", 1);
        older.archived_at = Utc::now() - Duration::hours(1);
        sink.write(&older).await.unwrap();
        sink.write(&record("newer", 2)).await.unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "ignore me").unwrap();
        std::fs::write(temp_dir.path().join("broken.json"), "{not json").unwrap();

        let listed = sink.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session_id, "newer");
        assert_eq!(listed[0].turn_count, 4);
        assert_eq!(listed[1].session_id, "older");
    }

    #[tokio::test]
    async fn test_missing_directory_reads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileArchiveSink::new(temp_dir.path().join("never-created"));
        assert!(sink.read("x").await.unwrap().is_none());
        assert!(sink.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsafe_ids_stay_inside_directory() {
        let temp_dir = TempDir::new().unwrap();
        let sink = FileArchiveSink::new(temp_dir.path());
        let path = sink.record_path("../../etc/passwd");
        assert_eq!(path.parent().unwrap(), temp_dir.path());
    }
}
