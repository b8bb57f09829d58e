//! The persisted unit ([`Entry`]) and the aggregate-snapshot persisted unit
//! ([`State`]), plus the shared [`Payload`] representation.

use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;

/// Wire payload for an [`Entry`]: either UTF-8 text (the default, JSON) or
/// an opaque binary blob for adapters that serialize differently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Returns the text payload, if this is a [`Payload::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            Payload::Binary(_) => None,
        }
    }

    /// Returns the binary payload, if this is a [`Payload::Binary`].
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Payload::Binary(b) => Some(b),
            Payload::Text(_) => None,
        }
    }
}

/// An [`Entry`] ready to be appended: everything an [`crate::adapter::EntryAdapter`]
/// can produce before the journal assigns it a global position.
///
/// Per the standardized 6-argument shape (id, symbolic type, type-version,
/// payload, stream-version, metadata), the stream version is already known
/// to the caller (it is the entity's `current_version + 1`), so it is
/// carried here; only the global position remains to be assigned by the
/// journal at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsavedEntry {
    pub id: String,
    pub r#type: String,
    pub type_version: u32,
    pub payload: Payload,
    pub stream_version: u64,
    pub metadata: Metadata,
}

impl UnsavedEntry {
    pub fn new(
        id: impl Into<String>,
        symbolic_type: impl Into<String>,
        type_version: u32,
        payload: Payload,
        stream_version: u64,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: id.into(),
            r#type: symbolic_type.into(),
            type_version,
            payload,
            stream_version,
            metadata,
        }
    }

    /// Stamps this unsaved entry with the global position assigned by the
    /// journal, turning it into a persisted [`Entry`].
    pub fn into_entry(self, global_position: u64) -> Entry {
        Entry {
            id: self.id,
            global_position: Some(global_position),
            r#type: self.r#type,
            type_version: self.type_version,
            payload: self.payload,
            stream_version: self.stream_version,
            metadata: self.metadata,
        }
    }
}

/// The on-disk envelope plus payload: the persisted unit of the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub global_position: Option<u64>,
    pub r#type: String,
    pub type_version: u32,
    pub payload: Payload,
    pub stream_version: u64,
    pub metadata: Metadata,
}

impl Entry {
    /// The symbolic (storage-stable) type name of this entry.
    pub fn symbolic_type(&self) -> &str {
        &self.r#type
    }
}

/// Snapshot payload variants: text/binary mirror [`Payload`], `Object` is
/// the in-process representation used when a snapshot never leaves memory
/// (e.g. the in-memory journal keeping the aggregate state struct as-is).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatePayload {
    Text(String),
    Binary(Vec<u8>),
    Object(serde_json::Value),
}

/// Persisted snapshot form, mirroring [`Entry`] but for aggregate state
/// rather than records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub id: String,
    pub r#type: String,
    pub type_version: u32,
    pub data: StatePayload,
    pub state_version: u64,
    pub metadata: Metadata,
}

impl State {
    pub fn new(
        id: impl Into<String>,
        symbolic_type: impl Into<String>,
        type_version: u32,
        data: StatePayload,
        state_version: u64,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: id.into(),
            r#type: symbolic_type.into(),
            type_version,
            data,
            state_version,
            metadata,
        }
    }

    /// An empty, "no snapshot" placeholder.
    pub fn empty() -> Self {
        Self {
            id: String::new(),
            r#type: String::new(),
            type_version: 0,
            data: StatePayload::Object(serde_json::Value::Null),
            state_version: 0,
            metadata: Metadata::empty(),
        }
    }

    /// `true` if this is the empty placeholder (no snapshot exists).
    pub fn is_empty(&self) -> bool {
        self.r#type.is_empty() && self.state_version == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsaved_entry_into_entry_stamps_global_position() {
        let unsaved = UnsavedEntry::new(
            "id-1",
            "account-opened",
            1,
            Payload::Text("{}".into()),
            1,
            Metadata::empty(),
        );

        let entry = unsaved.into_entry(42);
        assert_eq!(entry.global_position, Some(42));
        assert_eq!(entry.stream_version, 1);
    }

    #[test]
    fn empty_state_reports_empty() {
        assert!(State::empty().is_empty());

        let non_empty = State::new(
            "id-1",
            "balance",
            1,
            StatePayload::Object(serde_json::json!({"balance": 10})),
            5,
            Metadata::empty(),
        );
        assert!(!non_empty.is_empty());
    }
}
