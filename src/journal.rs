//! Append-only log with per-stream versioning, optimistic concurrency,
//! snapshots, stream lifecycle and cursor-based readers (spec §4.3).
//!
//! The trait shape follows `eventually-core::store::EventStore` /
//! `eventually::store::EventStore` (`eventually-core/src/store.rs`,
//! `eventually/src/store.rs`): a single `Error` type per operation, an
//! explicit expected-version sentinel for optimistic concurrency, and
//! stream vs. global reading split into two reader types. Unlike the
//! teacher, which parameterizes `EventStore<SourceId, Event>` over a single
//! Rust event type, this journal stores already-adapted [`Entry`] values:
//! adaptation from a concrete [`Source`](crate::source::Source) type
//! happens one layer up, in [`crate::entity`], so that `Journal` itself can
//! be held as a single `Arc<dyn Journal>` behind the host registry (spec
//! §6), exactly as a process-wide journal binding requires.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::entry::{Entry, State, UnsavedEntry};
use crate::error::{AppendResult, StorageError};
use crate::version::ExpectedVersion;

/// Current version, truncate-before floor, visible entry count and
/// lifecycle flags for a stream (spec §4.3 `stream_info`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamInfo {
    pub stream_version: u64,
    pub truncate_before: Option<u64>,
    pub visible_count: u64,
    pub is_tombstoned: bool,
    pub is_soft_deleted: bool,
}

/// A stream-scoped view: the visible entries of one stream, plus its
/// snapshot and lifecycle flags (spec §4.3).
#[derive(Debug, Clone, Default)]
pub struct EntryStream {
    pub stream_name: String,
    pub stream_version: u64,
    pub entries: Vec<Entry>,
    pub snapshot: Option<State>,
    pub is_tombstoned: bool,
    pub is_soft_deleted: bool,
}

/// A cached, per-stream reader returned by [`Journal::stream_reader`].
///
/// Bound to the stream name it was obtained for; repeated calls to
/// [`Journal::stream_reader`] with the same name return the same cached
/// instance (spec §4.3), so a `StreamReader` never needs a name parameter
/// of its own -- unlike the original source's `streamFor(name)`, whose
/// `parseInt(entry.id)` fallback sort is spec.md §9's incidental behavior
/// we deliberately do not carry over.
#[async_trait]
pub trait StreamReader: Send + Sync {
    /// The stream name this reader is bound to.
    fn stream_name(&self) -> &str;

    /// Fetches the current view of the bound stream.
    async fn read(&self) -> EntryStream;
}

/// A cached, named cursor reader over the journal's global sequence (spec
/// §4.3). Distinct reader names maintain independent positions (invariant
/// 9).
#[async_trait]
pub trait JournalReader: Send + Sync {
    /// The name this reader was obtained under.
    fn name(&self) -> &str;

    /// Reads up to `max` entries starting at the current position,
    /// advancing it past what was returned.
    async fn read_next(&self, max: usize) -> Vec<Entry>;

    /// Moves the cursor to an arbitrary global position. Seeking past the
    /// end is legal; subsequent reads return empty until entries arrive.
    async fn seek(&self, position: u64);

    /// The reader's current position (the global position of the next
    /// entry it would return).
    async fn position(&self) -> u64;

    /// Resets the cursor to the beginning of the journal.
    async fn rewind(&self);
}

/// Append-only, per-stream-versioned, globally-ordered log of [`Entry`]
/// values.
///
/// All operations are suspension points (spec §5): implementations must
/// re-verify the stream's current version after any `.await` rather than
/// trusting a value read before one.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Appends a single already-adapted entry.
    async fn append(
        &self,
        stream: &str,
        expected: ExpectedVersion,
        entry: UnsavedEntry,
    ) -> Result<AppendResult, StorageError> {
        self.append_all(stream, expected, vec![entry]).await
    }

    /// Appends a single entry and atomically replaces the stream's
    /// snapshot.
    async fn append_with(
        &self,
        stream: &str,
        expected: ExpectedVersion,
        entry: UnsavedEntry,
        snapshot: State,
    ) -> Result<AppendResult, StorageError> {
        self.append_all_with(stream, expected, vec![entry], snapshot)
            .await
    }

    /// Appends a batch of entries atomically: all-or-nothing, contiguous
    /// global positions, stream versions `from_expected..from_expected+n-1`.
    async fn append_all(
        &self,
        stream: &str,
        from_expected: ExpectedVersion,
        entries: Vec<UnsavedEntry>,
    ) -> Result<AppendResult, StorageError>;

    /// As [`Journal::append_all`], plus an atomic snapshot replacement
    /// whose `state_version` equals the last version in the batch.
    async fn append_all_with(
        &self,
        stream: &str,
        from_expected: ExpectedVersion,
        entries: Vec<UnsavedEntry>,
        snapshot: State,
    ) -> Result<AppendResult, StorageError>;

    /// Returns (and caches) a per-stream reader.
    async fn stream_reader(&self, name: &str) -> Arc<dyn StreamReader>;

    /// Returns (and caches) a global cursor reader with a durable,
    /// in-process position tracked under `name`.
    async fn journal_reader(&self, name: &str) -> Arc<dyn JournalReader>;

    /// Permanently, idempotently deletes a stream. Returns
    /// [`StorageError::AlreadyTombstoned`] on re-call,
    /// [`StorageError::NotFound`] if the stream never existed.
    async fn tombstone(&self, stream: &str) -> Result<(), StorageError>;

    /// Idempotently marks a stream deleted at its current version. Any
    /// subsequent append reopens it to active without renumbering.
    async fn soft_delete(&self, stream: &str) -> Result<(), StorageError>;

    /// Idempotently sets the visibility floor for reads; does not affect
    /// version assignment.
    async fn truncate_before(&self, stream: &str, version: u64) -> Result<(), StorageError>;

    /// Current version, truncate-before floor, visible count and
    /// lifecycle flags for a stream.
    async fn stream_info(&self, stream: &str) -> StreamInfo;
}
