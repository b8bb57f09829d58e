//! Pluggable serialization with per-record versioning and upcasting
//! (spec §4.2).
//!
//! The default text adapter mirrors `eventually`'s `JsonSerde<T>`
//! (`eventually/src/serde/json.rs`): a zero-sized, `PhantomData`-carrying
//! wrapper implementing serialization via `serde_json`. Upcasting and
//! property transforms are additions this crate's adapters need that the
//! teacher's plain `Serde<T>` trait didn't, since the teacher never
//! modeled schema evolution explicitly.

pub mod provider;

use std::collections::HashMap;
use std::fmt::Debug;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::entry::{Entry, Payload, State, StatePayload, UnsavedEntry};
use crate::metadata::Metadata;
use crate::source::Source;
use crate::type_mapper::StoreTypeMapper;

/// Errors raised while adapting between the in-memory and persisted shapes
/// of a record or aggregate state. These are raised, not returned as part
/// of a storage [`Outcome`](crate::error::StorageError): a bad schema is a
/// programming error, per spec §7's propagation policy.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("unsupported type version {version} for '{symbolic_type}' (current is {current})")]
    UnsupportedVersion {
        symbolic_type: String,
        version: u32,
        current: u32,
    },

    #[error("failed to deserialize '{symbolic_type}': {source}")]
    Deserialize {
        symbolic_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A mapping from property name to a conversion function applied to that
/// property's raw JSON value during deserialization, e.g. to turn an ISO
/// string or epoch-millis number into whatever shape the in-memory type
/// needs. Runs once per field, before the record is deserialized.
#[derive(Default)]
pub struct PropertyTransforms {
    transforms: HashMap<String, Box<dyn Fn(serde_json::Value) -> serde_json::Value + Send + Sync>>,
}

impl PropertyTransforms {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_transform(
        mut self,
        property: impl Into<String>,
        f: impl Fn(serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.transforms.insert(property.into(), Box::new(f));
        self
    }

    /// Applies all registered transforms to an object's top-level fields.
    /// Non-object values and unregistered fields pass through unchanged.
    fn apply(&self, mut value: serde_json::Value) -> serde_json::Value {
        if let serde_json::Value::Object(ref mut map) = value {
            for (key, transform) in &self.transforms {
                if let Some(field) = map.remove(key) {
                    map.insert(key.clone(), transform(field));
                }
            }
        }

        value
    }
}

/// An upcast step: lifts a JSON value from one type-version to the next.
pub type UpcastFn = Box<dyn Fn(serde_json::Value) -> serde_json::Value + Send + Sync>;

/// Serializes and deserializes [`Source`] records of a single Rust type `S`
/// to and from the journal's [`Entry`] representation.
pub trait EntryAdapter<S>: Send + Sync
where
    S: Source,
{
    /// Serializes `source` into an [`UnsavedEntry`], stamping it with the
    /// current type-version and the symbolic type name from the
    /// [`StoreTypeMapper`].
    fn to_entry(&self, source: &S, stream_version: u64, metadata: Metadata) -> UnsavedEntry;

    /// Deserializes an [`Entry`] back into `S`, upcasting older versions as
    /// needed. Fails with [`AdapterError::UnsupportedVersion`] for versions
    /// newer than what this adapter knows how to read.
    fn from_entry(&self, entry: &Entry) -> Result<S, AdapterError>;
}

/// Default JSON-backed [`EntryAdapter`]. Upcast steps are registered
/// per-version; `upcast_if_needed` walks them in order starting from the
/// entry's stored version up to `current_version`.
pub struct JsonEntryAdapter<S> {
    current_version: u32,
    upcasts: HashMap<u32, UpcastFn>,
    transforms: PropertyTransforms,
    type_name: &'static str,
    _marker: PhantomData<fn() -> S>,
}

impl<S> JsonEntryAdapter<S>
where
    S: Source,
{
    /// Creates a new adapter at the given `current_version`, using `S`'s
    /// short Rust type name for symbolic-name lookups.
    pub fn new(current_version: u32, type_name: &'static str) -> Self {
        Self {
            current_version,
            upcasts: HashMap::new(),
            transforms: PropertyTransforms::new(),
            type_name,
            _marker: PhantomData,
        }
    }

    /// Registers an upcast step from `from_version` to `from_version + 1`.
    #[must_use]
    pub fn with_upcast(
        mut self,
        from_version: u32,
        f: impl Fn(serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.upcasts.insert(from_version, Box::new(f));
        self
    }

    #[must_use]
    pub fn with_transforms(mut self, transforms: PropertyTransforms) -> Self {
        self.transforms = transforms;
        self
    }

    fn upcast_if_needed(
        &self,
        mut data: serde_json::Value,
        symbolic_type: &str,
        version: u32,
    ) -> Result<serde_json::Value, AdapterError> {
        if version > self.current_version {
            return Err(AdapterError::UnsupportedVersion {
                symbolic_type: symbolic_type.to_owned(),
                version,
                current: self.current_version,
            });
        }

        let mut v = version;
        while v < self.current_version {
            let step = self.upcasts.get(&v).ok_or_else(|| AdapterError::UnsupportedVersion {
                symbolic_type: symbolic_type.to_owned(),
                version,
                current: self.current_version,
            })?;
            data = step(data);
            v += 1;
        }

        Ok(data)
    }
}

impl<S> EntryAdapter<S> for JsonEntryAdapter<S>
where
    S: Source + Serialize + DeserializeOwned,
{
    fn to_entry(&self, source: &S, stream_version: u64, metadata: Metadata) -> UnsavedEntry {
        let symbolic_type = StoreTypeMapper::global().to_symbolic_name(self.type_name);
        let payload = serde_json::to_string(source).expect("json serialization should not fail");

        UnsavedEntry::new(
            uuid_like(),
            symbolic_type,
            self.current_version,
            Payload::Text(payload),
            stream_version,
            metadata,
        )
    }

    fn from_entry(&self, entry: &Entry) -> Result<S, AdapterError> {
        let text = entry.payload.as_text().unwrap_or_default();

        let raw: serde_json::Value =
            serde_json::from_str(text).map_err(|source| AdapterError::Deserialize {
                symbolic_type: entry.r#type.clone(),
                source,
            })?;

        let upcasted = self.upcast_if_needed(raw, &entry.r#type, entry.type_version)?;
        let transformed = self.transforms.apply(upcasted);

        serde_json::from_value(transformed).map_err(|source| AdapterError::Deserialize {
            symbolic_type: entry.r#type.clone(),
            source,
        })
    }
}

/// Symmetric adapter for aggregate snapshots.
pub trait StateAdapter<S>: Send + Sync {
    fn to_state(&self, state: &S, state_version: u64, metadata: Metadata) -> State;
    fn from_state(&self, state: &State) -> Result<S, AdapterError>;
}

/// Default JSON-backed [`StateAdapter`].
pub struct JsonStateAdapter<S> {
    current_version: u32,
    upcasts: HashMap<u32, UpcastFn>,
    type_name: &'static str,
    _marker: PhantomData<fn() -> S>,
}

impl<S> JsonStateAdapter<S> {
    pub fn new(current_version: u32, type_name: &'static str) -> Self {
        Self {
            current_version,
            upcasts: HashMap::new(),
            type_name,
            _marker: PhantomData,
        }
    }

    #[must_use]
    pub fn with_upcast(
        mut self,
        from_version: u32,
        f: impl Fn(serde_json::Value) -> serde_json::Value + Send + Sync + 'static,
    ) -> Self {
        self.upcasts.insert(from_version, Box::new(f));
        self
    }

    fn upcast_if_needed(
        &self,
        mut data: serde_json::Value,
        symbolic_type: &str,
        version: u32,
    ) -> Result<serde_json::Value, AdapterError> {
        if version > self.current_version {
            return Err(AdapterError::UnsupportedVersion {
                symbolic_type: symbolic_type.to_owned(),
                version,
                current: self.current_version,
            });
        }

        let mut v = version;
        while v < self.current_version {
            let step = self.upcasts.get(&v).ok_or_else(|| AdapterError::UnsupportedVersion {
                symbolic_type: symbolic_type.to_owned(),
                version,
                current: self.current_version,
            })?;
            data = step(data);
            v += 1;
        }

        Ok(data)
    }
}

impl<S> StateAdapter<S> for JsonStateAdapter<S>
where
    S: Serialize + DeserializeOwned + Send + Sync,
{
    fn to_state(&self, state: &S, state_version: u64, metadata: Metadata) -> State {
        let symbolic_type = StoreTypeMapper::global().to_symbolic_name(self.type_name);
        let value = serde_json::to_value(state).expect("json serialization should not fail");

        State::new(
            uuid_like(),
            symbolic_type,
            self.current_version,
            StatePayload::Object(value),
            state_version,
            metadata,
        )
    }

    fn from_state(&self, state: &State) -> Result<S, AdapterError> {
        let raw = match &state.data {
            StatePayload::Object(v) => v.clone(),
            StatePayload::Text(s) => {
                serde_json::from_str(s).map_err(|source| AdapterError::Deserialize {
                    symbolic_type: state.r#type.clone(),
                    source,
                })?
            }
            StatePayload::Binary(_) => serde_json::Value::Null,
        };

        let upcasted = self.upcast_if_needed(raw, &state.r#type, state.type_version)?;

        serde_json::from_value(upcasted).map_err(|source| AdapterError::Deserialize {
            symbolic_type: state.r#type.clone(),
            source,
        })
    }
}

/// Cheap, dependency-free unique id generator for entries/states created by
/// the default adapters. Not a cryptographic UUID; just unique enough for a
/// single process's journal.
fn uuid_like() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("{:016x}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct UserRegisteredV1 {
        email: String,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct UserRegistered {
        email: String,
        name: String,
        role: String,
    }

    impl Source for UserRegistered {
        fn created_at(&self) -> i64 {
            0
        }
        fn type_version(&self) -> u32 {
            3
        }
        fn type_name(&self) -> &'static str {
            "UserRegistered"
        }
    }

    #[test]
    fn upcasts_v1_to_current_version() {
        let adapter = JsonEntryAdapter::<UserRegistered>::new(3, "UserRegistered").with_upcast(
            1,
            |mut v| {
                v["name"] = serde_json::json!("Unknown");
                v["role"] = serde_json::json!("user");
                v
            },
        );

        let entry = Entry {
            id: "1".into(),
            global_position: Some(1),
            r#type: "user-registered".into(),
            type_version: 1,
            payload: Payload::Text(
                serde_json::to_string(&UserRegisteredV1 {
                    email: "a@b.com".into(),
                })
                .unwrap(),
            ),
            stream_version: 1,
            metadata: Metadata::empty(),
        };

        let record = adapter.from_entry(&entry).unwrap();
        assert_eq!(record.email, "a@b.com");
        assert_eq!(record.name, "Unknown");
        assert_eq!(record.role, "user");
    }

    #[test]
    fn unsupported_version_fails() {
        let adapter = JsonEntryAdapter::<UserRegistered>::new(3, "UserRegistered");

        let entry = Entry {
            id: "1".into(),
            global_position: Some(1),
            r#type: "user-registered".into(),
            type_version: 99,
            payload: Payload::Text("{}".into()),
            stream_version: 1,
            metadata: Metadata::empty(),
        };

        assert!(matches!(
            adapter.from_entry(&entry),
            Err(AdapterError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn round_trip_without_upcasting() {
        let adapter = JsonEntryAdapter::<UserRegistered>::new(3, "UserRegistered");
        let record = UserRegistered {
            email: "a@b.com".into(),
            name: "Ann".into(),
            role: "admin".into(),
        };

        let unsaved = adapter.to_entry(&record, 1, Metadata::empty());
        let entry = unsaved.into_entry(10);
        let back = adapter.from_entry(&entry).unwrap();

        assert_eq!(record, back);
    }
}
