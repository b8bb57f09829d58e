//! Projection pipeline (spec §4.5): a journal consumer polls the global
//! cursor, a dispatcher routes records to projections by pattern matching,
//! and a confirmer tracks pending vs. confirmed work.
//!
//! Grounded in `eventually-util::inmemory::Projector`
//! (`eventually-util/src/inmemory/projector.rs`), which pulls a
//! `Subscription` stream and calls `Projection::project` per event; this
//! module generalizes that single-projection loop into dispatch-by-pattern
//! over an arbitrary registry of projections.

pub mod confirmer;
pub mod consumer;
pub mod dispatcher;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::entry::{Entry, StatePayload};
use dispatcher::ProjectionControl;

/// Read-only view over persisted content fed to projections. Shape
/// independent: a projectable may carry a single object, raw text/bytes, or
/// a batch of journal entries, but always exposes the same identifying
/// queries plus `because_of`.
pub trait Projectable: Send + Sync {
    fn data_id(&self) -> &str;
    fn data_version(&self) -> u64;
    fn r#type(&self) -> &str;
    fn type_version(&self) -> u32;

    /// The causes (symbolic types) this projectable was produced from, used
    /// by the dispatcher's pattern matching.
    fn because_of(&self) -> &[String];

    fn has_object(&self) -> bool {
        false
    }
    fn has_entries(&self) -> bool {
        false
    }

    fn object(&self) -> Option<&StatePayload> {
        None
    }
    fn data_as_text(&self) -> Option<&str> {
        None
    }
    fn data_as_bytes(&self) -> Option<&[u8]> {
        None
    }
    fn entries(&self) -> &[Entry] {
        &[]
    }
}

/// A [`Projectable`] wrapping a batch of journal entries, as produced by the
/// [`consumer::JournalConsumer`] polling loop.
pub struct EntryBatchProjectable {
    data_id: String,
    data_version: u64,
    r#type: String,
    type_version: u32,
    because_of: Vec<String>,
    entries: Vec<Entry>,
}

impl EntryBatchProjectable {
    /// Builds a projectable from a non-empty batch. `because_of` is the set
    /// of distinct symbolic types in the batch, preserving first-seen order
    /// (spec §4.5's `JournalConsumer` polling loop, step 3). The identifying
    /// fields mirror the batch's last entry.
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        let because_of = distinct_first_seen(entries.iter().map(|e| e.symbolic_type().to_owned()));

        let (data_id, data_version, r#type, type_version) = entries
            .last()
            .map(|e| (e.id.clone(), e.stream_version, e.r#type.clone(), e.type_version))
            .unwrap_or_default();

        Self {
            data_id,
            data_version,
            r#type,
            type_version,
            because_of,
            entries,
        }
    }
}

impl Projectable for EntryBatchProjectable {
    fn data_id(&self) -> &str {
        &self.data_id
    }
    fn data_version(&self) -> u64 {
        self.data_version
    }
    fn r#type(&self) -> &str {
        &self.r#type
    }
    fn type_version(&self) -> u32 {
        self.type_version
    }
    fn because_of(&self) -> &[String] {
        &self.because_of
    }
    fn has_entries(&self) -> bool {
        true
    }
    fn entries(&self) -> &[Entry] {
        &self.entries
    }
}

fn distinct_first_seen(iter: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in iter {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

/// A read-model builder that folds [`Projectable`]s into documents.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &str;

    async fn project_with(
        &self,
        projectable: &dyn Projectable,
        control: &ProjectionControl,
    ) -> Result<(), anyhow::Error>;
}

/// Binds a [`Projection`] to the `because_of` patterns it cares about, plus
/// a human-readable description. Invariant: `patterns` non-empty,
/// `description` non-empty (spec §4.5).
pub struct ProjectToDescription {
    pub projection: Arc<dyn Projection>,
    pub patterns: Vec<String>,
    pub description: String,
}

impl ProjectToDescription {
    pub fn new(
        projection: Arc<dyn Projection>,
        patterns: Vec<String>,
        description: impl Into<String>,
    ) -> Self {
        assert!(!patterns.is_empty(), "ProjectToDescription requires at least one pattern");
        let description = description.into();
        assert!(!description.is_empty(), "ProjectToDescription requires a non-empty description");

        Self {
            projection,
            patterns,
            description,
        }
    }

    /// `true` iff any of this description's patterns matches any cause.
    /// An empty cause list never matches (spec §4.5, invariant 7).
    pub fn matches(&self, causes: &[String]) -> bool {
        if causes.is_empty() {
            return false;
        }

        self.patterns
            .iter()
            .any(|pattern| causes.iter().any(|cause| pattern_matches(pattern, cause)))
    }
}

/// Glob-style, case-sensitive pattern matching (spec §4.5, invariant 7):
/// exact, prefix (`X*`), suffix (`*X`), contains (`*X*`), namespace dot-glob
/// (just a prefix pattern, e.g. `com.example.*`), and universal (`*`).
pub(crate) fn pattern_matches(pattern: &str, cause: &str) -> bool {
    let starts = pattern.starts_with('*');
    let ends = pattern.ends_with('*');

    match (starts, ends) {
        (true, true) if pattern.len() >= 2 => {
            let inner = &pattern[1..pattern.len() - 1];
            inner.is_empty() || cause.contains(inner)
        }
        (true, true) => true, // pattern == "*"
        (false, true) => cause.starts_with(&pattern[..pattern.len() - 1]),
        (true, false) => cause.ends_with(&pattern[1..]),
        (false, false) => cause == pattern,
    }
}
