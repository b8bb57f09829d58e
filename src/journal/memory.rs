//! In-memory reference [`Journal`] implementation.
//!
//! Grounded in `eventually-util`'s `inmemory::EventStore`
//! (`eventually-util/src/inmemory.rs`), which backs an event store with an
//! `Arc<RwLock<HashMap<Id, Vec<Event>>>>`. This journal generalizes that
//! shape to cover stream lifecycle, snapshots and a separate
//! globally-ordered log for cursor readers, using `parking_lot::RwLock`
//! (as the teacher's workspace root `Cargo.toml` depends on it) since every
//! critical section here is synchronous -- no `.await` is ever held across
//! a lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::entry::{Entry, State, UnsavedEntry};
use crate::error::{AppendResult, StorageError};
use crate::journal::{EntryStream, Journal, JournalReader, StreamInfo, StreamReader};
use crate::version::ExpectedVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Lifecycle {
    #[default]
    Active,
    SoftDeleted,
    Tombstoned,
}

#[derive(Default)]
struct StreamRecord {
    entries: Vec<Entry>,
    version: u64,
    snapshot: Option<State>,
    lifecycle: Lifecycle,
    truncate_before: Option<u64>,
}

#[derive(Default)]
struct Inner {
    streams: HashMap<String, StreamRecord>,
    global_log: Vec<Entry>,
    next_global_position: u64,
    stream_readers: HashMap<String, Arc<InMemoryStreamReader>>,
    journal_readers: HashMap<String, Arc<InMemoryJournalReader>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            next_global_position: 1,
            ..Default::default()
        }
    }
}

/// The in-memory reference [`Journal`] implementation. Suitable for tests
/// and single-process hosts; does not survive a restart.
#[derive(Clone)]
pub struct InMemoryJournal {
    inner: Arc<RwLock<Inner>>,
}

impl Default for InMemoryJournal {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::new())),
        }
    }
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Computes the human-readable "expected" version to report in a
/// [`StorageError::ConcurrencyViolation`] for a given sentinel/current pair.
fn expected_for_error(expected: ExpectedVersion, current: u64) -> u64 {
    match expected {
        ExpectedVersion::Any => current + 1,
        ExpectedVersion::NoStream => 1,
        ExpectedVersion::StreamExists => current.max(1) + 1,
        ExpectedVersion::Concrete(v) => v,
    }
}

#[async_trait]
impl Journal for InMemoryJournal {
    async fn append_all(
        &self,
        stream: &str,
        from_expected: ExpectedVersion,
        entries: Vec<UnsavedEntry>,
    ) -> Result<AppendResult, StorageError> {
        self.append_all_inner(stream, from_expected, entries, None)
    }

    async fn append_all_with(
        &self,
        stream: &str,
        from_expected: ExpectedVersion,
        entries: Vec<UnsavedEntry>,
        snapshot: State,
    ) -> Result<AppendResult, StorageError> {
        self.append_all_inner(stream, from_expected, entries, Some(snapshot))
    }

    async fn stream_reader(&self, name: &str) -> Arc<dyn StreamReader> {
        let mut inner = self.inner.write();
        inner
            .stream_readers
            .entry(name.to_owned())
            .or_insert_with(|| {
                Arc::new(InMemoryStreamReader {
                    name: name.to_owned(),
                    inner: self.inner.clone(),
                })
            })
            .clone()
    }

    async fn journal_reader(&self, name: &str) -> Arc<dyn JournalReader> {
        let mut inner = self.inner.write();
        inner
            .journal_readers
            .entry(name.to_owned())
            .or_insert_with(|| {
                Arc::new(InMemoryJournalReader {
                    name: name.to_owned(),
                    inner: self.inner.clone(),
                    position: Mutex::new(1),
                })
            })
            .clone()
    }

    async fn tombstone(&self, stream: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let record = inner
            .streams
            .get_mut(stream)
            .ok_or_else(|| StorageError::NotFound(stream.to_owned()))?;

        if record.lifecycle == Lifecycle::Tombstoned {
            return Err(StorageError::AlreadyTombstoned(stream.to_owned()));
        }

        record.lifecycle = Lifecycle::Tombstoned;
        Ok(())
    }

    async fn soft_delete(&self, stream: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let record = inner
            .streams
            .get_mut(stream)
            .ok_or_else(|| StorageError::NotFound(stream.to_owned()))?;

        match record.lifecycle {
            Lifecycle::Tombstoned => Err(StorageError::StreamDeleted(stream.to_owned())),
            Lifecycle::SoftDeleted => Ok(()),
            Lifecycle::Active => {
                record.lifecycle = Lifecycle::SoftDeleted;
                Ok(())
            }
        }
    }

    async fn truncate_before(&self, stream: &str, version: u64) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        let record = inner
            .streams
            .get_mut(stream)
            .ok_or_else(|| StorageError::NotFound(stream.to_owned()))?;

        record.truncate_before = Some(version);
        Ok(())
    }

    async fn stream_info(&self, stream: &str) -> StreamInfo {
        let inner = self.inner.read();
        let Some(record) = inner.streams.get(stream) else {
            return StreamInfo::default();
        };

        StreamInfo {
            stream_version: record.version,
            truncate_before: record.truncate_before,
            visible_count: visible_entries(record).count() as u64,
            is_tombstoned: record.lifecycle == Lifecycle::Tombstoned,
            is_soft_deleted: record.lifecycle == Lifecycle::SoftDeleted,
        }
    }
}

impl InMemoryJournal {
    fn append_all_inner(
        &self,
        stream: &str,
        from_expected: ExpectedVersion,
        entries: Vec<UnsavedEntry>,
        snapshot: Option<State>,
    ) -> Result<AppendResult, StorageError> {
        let mut inner = self.inner.write();

        let current = inner
            .streams
            .get(stream)
            .map(|r| (r.version, r.lifecycle))
            .unwrap_or((0, Lifecycle::Active));

        if current.1 == Lifecycle::Tombstoned {
            return Err(StorageError::StreamDeleted(stream.to_owned()));
        }

        let current_version = current.0;
        let starting = from_expected.check(current_version).ok_or_else(|| {
            StorageError::ConcurrencyViolation {
                expected: expected_for_error(from_expected, current_version),
                actual: current_version,
            }
        })?;

        let record = inner
            .streams
            .entry(stream.to_owned())
            .or_insert_with(StreamRecord::default);

        let mut first_pos = None;
        let mut last_pos = 0;

        for (i, unsaved) in entries.into_iter().enumerate() {
            let stream_version = starting + i as u64;
            let global_position = inner.next_global_position;
            inner.next_global_position += 1;

            let mut entry = unsaved.into_entry(global_position);
            entry.stream_version = stream_version;

            first_pos.get_or_insert(global_position);
            last_pos = global_position;

            inner.global_log.push(entry.clone());

            let record = inner.streams.get_mut(stream).expect("just inserted");
            record.entries.push(entry);
            record.version = stream_version;
        }

        let record = inner.streams.get_mut(stream).expect("just inserted");
        record.lifecycle = Lifecycle::Active;
        if let Some(snapshot) = snapshot {
            record.snapshot = Some(snapshot);
        }

        let _ = record; // silence unused warning when entries was empty in debug builds

        Ok(AppendResult {
            stream_version: inner.streams[stream].version,
            first_global_position: first_pos.unwrap_or(0),
            last_global_position: last_pos,
        })
    }
}

fn visible_entries(record: &StreamRecord) -> impl Iterator<Item = &Entry> {
    let floor = record.truncate_before.unwrap_or(1);
    record
        .entries
        .iter()
        .filter(move |e| e.stream_version >= floor)
}

struct InMemoryStreamReader {
    name: String,
    inner: Arc<RwLock<Inner>>,
}

#[async_trait]
impl StreamReader for InMemoryStreamReader {
    fn stream_name(&self) -> &str {
        &self.name
    }

    async fn read(&self) -> EntryStream {
        let inner = self.inner.read();

        let Some(record) = inner.streams.get(&self.name) else {
            return EntryStream {
                stream_name: self.name.clone(),
                ..Default::default()
            };
        };

        if record.lifecycle == Lifecycle::Tombstoned {
            return EntryStream {
                stream_name: self.name.clone(),
                stream_version: record.version,
                entries: Vec::new(),
                snapshot: None,
                is_tombstoned: true,
                is_soft_deleted: false,
            };
        }

        EntryStream {
            stream_name: self.name.clone(),
            stream_version: record.version,
            entries: visible_entries(record).cloned().collect(),
            snapshot: record.snapshot.clone(),
            is_tombstoned: false,
            is_soft_deleted: record.lifecycle == Lifecycle::SoftDeleted,
        }
    }
}

struct InMemoryJournalReader {
    name: String,
    inner: Arc<RwLock<Inner>>,
    position: Mutex<u64>,
}

#[async_trait]
impl JournalReader for InMemoryJournalReader {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_next(&self, max: usize) -> Vec<Entry> {
        let inner = self.inner.read();
        let mut position = self.position.lock();

        let batch: Vec<Entry> = inner
            .global_log
            .iter()
            .filter(|e| e.global_position.unwrap_or(0) >= *position)
            .take(max)
            .cloned()
            .collect();

        if let Some(last) = batch.last() {
            *position = last.global_position.unwrap_or(*position) + 1;
        }

        batch
    }

    async fn seek(&self, position: u64) {
        *self.position.lock() = position;
    }

    async fn position(&self) -> u64 {
        *self.position.lock()
    }

    async fn rewind(&self) {
        *self.position.lock() = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Payload;
    use crate::metadata::Metadata;

    fn entry(id: &str, text: &str) -> UnsavedEntry {
        UnsavedEntry::new(id, "test-event", 1, Payload::Text(text.into()), 0, Metadata::empty())
    }

    #[tokio::test]
    async fn append_assigns_contiguous_versions_and_positions() {
        let journal = InMemoryJournal::new();

        let result = journal
            .append_all(
                "s1",
                ExpectedVersion::NoStream,
                vec![entry("1", "a"), entry("2", "b"), entry("3", "c")],
            )
            .await
            .unwrap();

        assert_eq!(result.stream_version, 3);
        assert_eq!(result.last_global_position - result.first_global_position, 2);
    }

    #[tokio::test]
    async fn concurrent_appends_one_wins_one_conflicts() {
        let journal = InMemoryJournal::new();
        journal
            .append_all("s1", ExpectedVersion::NoStream, vec![entry("1", "a")])
            .await
            .unwrap();
        for _ in 0..4 {
            journal
                .append_all("s1", ExpectedVersion::Any, vec![entry("x", "x")])
                .await
                .unwrap();
        }

        // current_version == 5 now.
        let a = journal
            .append_all("s1", ExpectedVersion::Concrete(6), vec![entry("6a", "a")])
            .await;
        let b = journal
            .append_all("s1", ExpectedVersion::Concrete(6), vec![entry("6b", "b")])
            .await;

        // Since these two calls are sequential (not actually concurrent) in
        // this test, the second must fail with a concurrency violation.
        assert!(a.is_ok());
        assert!(matches!(b, Err(StorageError::ConcurrencyViolation { .. })));
    }

    #[tokio::test]
    async fn tombstone_is_terminal_and_idempotent_errors() {
        let journal = InMemoryJournal::new();
        journal
            .append_all("s1", ExpectedVersion::NoStream, vec![entry("1", "a")])
            .await
            .unwrap();

        journal.tombstone("s1").await.unwrap();

        let append_after = journal
            .append_all("s1", ExpectedVersion::Any, vec![entry("2", "b")])
            .await;
        assert!(matches!(append_after, Err(StorageError::StreamDeleted(_))));

        let re_tombstone = journal.tombstone("s1").await;
        assert!(matches!(re_tombstone, Err(StorageError::AlreadyTombstoned(_))));

        let reader = journal.stream_reader("s1").await;
        let view = reader.read().await;
        assert!(view.is_tombstoned);
        assert!(view.entries.is_empty());
    }

    #[tokio::test]
    async fn soft_delete_reopens_on_append() {
        let journal = InMemoryJournal::new();
        journal
            .append_all("s1", ExpectedVersion::NoStream, vec![entry("1", "a")])
            .await
            .unwrap();
        journal.soft_delete("s1").await.unwrap();

        let info = journal.stream_info("s1").await;
        assert!(info.is_soft_deleted);

        journal
            .append_all("s1", ExpectedVersion::Any, vec![entry("2", "b")])
            .await
            .unwrap();

        let info = journal.stream_info("s1").await;
        assert!(!info.is_soft_deleted);
        assert_eq!(info.stream_version, 2);
    }

    #[tokio::test]
    async fn truncate_before_hides_earlier_entries_without_renumbering() {
        let journal = InMemoryJournal::new();
        journal
            .append_all(
                "s1",
                ExpectedVersion::NoStream,
                vec![entry("1", "a"), entry("2", "b"), entry("3", "c")],
            )
            .await
            .unwrap();

        journal.truncate_before("s1", 3).await.unwrap();

        let reader = journal.stream_reader("s1").await;
        let view = reader.read().await;
        assert_eq!(view.entries.len(), 1);
        assert_eq!(view.entries[0].stream_version, 3);
        assert_eq!(view.stream_version, 3);
    }

    #[tokio::test]
    async fn independent_journal_reader_positions() {
        let journal = InMemoryJournal::new();
        journal
            .append_all("s1", ExpectedVersion::NoStream, vec![entry("1", "a"), entry("2", "b")])
            .await
            .unwrap();

        let reader_a = journal.journal_reader("a").await;
        let reader_b = journal.journal_reader("b").await;

        let batch_a = reader_a.read_next(1).await;
        assert_eq!(batch_a.len(), 1);
        assert_eq!(reader_a.position().await, 2);
        assert_eq!(reader_b.position().await, 1);
    }

    #[tokio::test]
    async fn seeking_past_end_then_writing_delivers_new_entries() {
        let journal = InMemoryJournal::new();
        let reader = journal.journal_reader("r").await;
        reader.seek(100).await;

        assert!(reader.read_next(10).await.is_empty());

        journal
            .append_all("s1", ExpectedVersion::NoStream, vec![entry("1", "a")])
            .await
            .unwrap();

        // The reader sought past the only entry available; it stays empty
        // until new entries are appended at or after its sought position.
        assert!(reader.read_next(10).await.is_empty());

        reader.seek(1).await;
        let batch = reader.read_next(10).await;
        assert_eq!(batch.len(), 1);
    }
}
