//! Sourced entity runtime (spec §4.4): handler registration with
//! inheritance lookup, apply-then-persist, restore-from-journal, snapshot
//! skipping, and context-scoped journal/adapter binding.
//!
//! Grounded in `eventually-core::aggregate::{Aggregate, AggregateRoot}`
//! (`eventually-core/src/aggregate.rs`), generalized per spec §9's design
//! notes: the teacher's static `Aggregate::apply(&mut self, Event)` match
//! arm becomes an explicit, resettable handler table (the "prototype-walk
//! -> explicit type hierarchy registry" translation spec §9 calls for),
//! since this crate's entities are not all known at the same compile unit
//! the teacher's aggregates are.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::adapter::provider::{ContextProfile, EntryAdapterProvider};
use crate::adapter::{AdapterError, EntryAdapter};
use crate::entry::{Entry, State, UnsavedEntry};
use crate::error::StorageError;
use crate::journal::Journal;
use crate::metadata::Metadata;
use crate::registry::HostRegistry;
use crate::source::Source;
use crate::type_mapper::StoreTypeMapper;
use crate::version::ExpectedVersion;

/// An in-memory aggregate whose state is the fold of its stream.
///
/// Implementors are never held as trait objects: `apply`/`restore` are free
/// functions generic over a concrete `E: SourcedEntity`, which keeps the
/// handler registry's `downcast`s sound without requiring `SourcedEntity`
/// itself to be object-safe.
pub trait SourcedEntity: Send + Sync + Sized + 'static {
    /// The stream this entity is bound to.
    fn stream_name(&self) -> String;

    fn current_version(&self) -> u64;
    fn set_current_version(&mut self, version: u64);

    /// Bounded context this entity resolves its journal and adapters
    /// through (spec §4.4). Defaults to `"default"`.
    fn context_name(&self) -> &str {
        "default"
    }

    /// Ordered type-ids this entity identifies as for handler lookup, most
    /// derived first. The default is just `Self`; a subclass-like entity
    /// that wants to inherit a base entity's handlers overrides this to
    /// list itself followed by the base entity's `TypeId`.
    fn type_hierarchy() -> Vec<TypeId>
    where
        Self: Sized,
    {
        vec![TypeId::of::<Self>()]
    }

    /// Returns a snapshot to persist alongside the next append, if one is
    /// due. Returning `Some` here is what triggers `append_all_with`
    /// instead of `append_all`.
    fn snapshot(&self) -> Option<State> {
        None
    }

    /// Restores from a persisted snapshot. Implementors set their own
    /// fields from `snapshot`'s payload; `current_version` is set by the
    /// caller (`restore`) immediately after this returns.
    fn restore_snapshot(&mut self, snapshot: State, stream_version: u64);

    fn before_apply(&mut self, _record_count: usize) {}

    fn after_apply(&mut self) {}

    /// Called when the append underlying an `apply` fails. Returning
    /// `true` (the default) re-raises the failure to the caller; `false`
    /// swallows it, and `apply`/`apply_and_then` return `Ok(())`.
    fn after_apply_failed(&mut self, _error: &StorageError) -> bool {
        true
    }
}

/// Carries everything needed to retry or inspect a failed `apply`: the
/// records that were never persisted, the snapshot that would have been
/// attached, the metadata, and the underlying storage error.
#[derive(Debug)]
pub struct ApplyFailed<S> {
    pub records: Vec<S>,
    pub snapshot: Option<State>,
    pub metadata: Metadata,
    pub error: StorageError,
}

type ApplyFoldFn = dyn Fn(&mut dyn Any, &dyn Any) + Send + Sync;
type RestoreFoldFn = dyn Fn(&mut dyn Any, &Entry) -> Result<(), AdapterError> + Send + Sync;

/// Process-wide mapping `entity type -> (record type -> fold function)`
/// (spec §4.4), with inheritance resolved by walking the entity's
/// `type_hierarchy()` and stopping at the first hit.
///
/// A single [`HandlerRegistry::register`] call populates two tables: one
/// keyed by the record's Rust `TypeId` (used by `apply`, which already
/// holds a concrete in-memory record) and one keyed by its persisted
/// symbolic type name (used by `restore`, which only has a journal
/// [`Entry`] and must decode before folding).
#[derive(Default)]
pub struct HandlerRegistry {
    apply_handlers: RwLock<HashMap<(TypeId, TypeId), Arc<ApplyFoldFn>>>,
    restore_handlers: RwLock<HashMap<(TypeId, String), Arc<RestoreFoldFn>>>,
}

impl HandlerRegistry {
    /// Returns the process-wide singleton instance.
    pub fn global() -> Arc<HandlerRegistry> {
        GLOBAL_HANDLERS.clone()
    }

    /// Registers the fold handler for record type `R` against entity type
    /// `E`, under the persisted `symbolic_type` that `adapter` stamps
    /// entries of `R` with. Registration is expected to happen once, at
    /// process startup.
    pub fn register<E, R>(
        &self,
        symbolic_type: impl Into<String>,
        adapter: Arc<dyn EntryAdapter<R>>,
        fold: impl Fn(&mut E, &R) + Send + Sync + 'static,
    ) where
        E: 'static,
        R: Source + 'static,
    {
        let fold = Arc::new(fold);

        let apply_fold = {
            let fold = fold.clone();
            move |entity: &mut dyn Any, record: &dyn Any| {
                let entity = entity
                    .downcast_mut::<E>()
                    .expect("handler registry: entity type mismatch");
                let record = record
                    .downcast_ref::<R>()
                    .expect("handler registry: record type mismatch");
                fold(entity, record);
            }
        };

        let restore_fold = move |entity: &mut dyn Any, entry: &Entry| -> Result<(), AdapterError> {
            let entity = entity
                .downcast_mut::<E>()
                .expect("handler registry: entity type mismatch");
            let record = adapter.from_entry(entry)?;
            fold(entity, &record);
            Ok(())
        };

        self.apply_handlers
            .write()
            .insert((TypeId::of::<E>(), TypeId::of::<R>()), Arc::new(apply_fold));
        self.restore_handlers
            .write()
            .insert((TypeId::of::<E>(), symbolic_type.into()), Arc::new(restore_fold));
    }

    /// Convenience over [`HandlerRegistry::register`] that resolves the
    /// adapter and symbolic type for `R` the same way `apply`/`restore`
    /// would (context profile, falling back to the global provider).
    pub fn register_default<E, R>(
        &self,
        context_name: &str,
        type_name: &'static str,
        fold: impl Fn(&mut E, &R) + Send + Sync + 'static,
    ) where
        E: 'static,
        R: Source + Serialize + DeserializeOwned + 'static,
    {
        let adapter = resolve_entry_adapter::<R>(context_name, type_name);
        let symbolic = StoreTypeMapper::global().to_symbolic_name(type_name);
        self.register(symbolic, adapter, fold);
    }

    fn resolve_apply(&self, hierarchy: &[TypeId], record: TypeId) -> Option<Arc<ApplyFoldFn>> {
        let handlers = self.apply_handlers.read();
        hierarchy.iter().find_map(|e| handlers.get(&(*e, record)).cloned())
    }

    fn resolve_restore(&self, hierarchy: &[TypeId], symbolic_type: &str) -> Option<Arc<RestoreFoldFn>> {
        let handlers = self.restore_handlers.read();
        hierarchy
            .iter()
            .find_map(|e| handlers.get(&(*e, symbolic_type.to_owned())).cloned())
    }

    /// Folds an in-memory record directly into `entity`. Missing handler is
    /// a fatal programming error (spec §7): it panics rather than returning
    /// a recoverable error.
    pub fn fold<E, R>(&self, entity: &mut E, record: &R)
    where
        E: SourcedEntity,
        R: 'static,
    {
        let handler = self
            .resolve_apply(&E::type_hierarchy(), TypeId::of::<R>())
            .unwrap_or_else(|| panic!("no handler registered for this record type against the entity's type hierarchy"));
        handler(entity, record);
    }

    /// Decodes and folds a persisted entry into `entity` by its symbolic
    /// type. Missing handler is fatal, same as [`HandlerRegistry::fold`].
    pub fn fold_entry<E: SourcedEntity>(&self, entity: &mut E, entry: &Entry) {
        let handler = self
            .resolve_restore(&E::type_hierarchy(), entry.symbolic_type())
            .unwrap_or_else(|| {
                panic!(
                    "no handler registered for record type '{}' against the entity's type hierarchy",
                    entry.symbolic_type()
                )
            });

        handler(entity, entry)
            .unwrap_or_else(|e| panic!("failed to decode record '{}' during restore: {e}", entry.symbolic_type()));
    }

    /// Clears all registrations. For test isolation.
    pub fn reset(&self) {
        self.apply_handlers.write().clear();
        self.restore_handlers.write().clear();
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_HANDLERS: Arc<HandlerRegistry> = Arc::new(HandlerRegistry::default());
}

/// Resolves the journal bound to `context_name` via the host registry, at
/// key `domo-tactical:<context>.journal`. Returns `None` if the host hasn't
/// (yet) injected one -- entities permit this binding to happen late.
pub fn resolve_journal(context_name: &str) -> Option<Arc<dyn Journal>> {
    let profile = ContextProfile::for_context(context_name);
    HostRegistry::global().registered_value::<Arc<dyn Journal>>(&profile.journal_key())
}

/// Resolves the `EntryAdapter<S>` for `context_name`: the context
/// profile's own registration if one exists, else the global provider
/// (which in turn falls back to a default JSON adapter). Both `apply` and
/// `restore` route through this single function, per spec §9's note that
/// both paths must use the same context-resolved provider.
fn resolve_entry_adapter<S>(context_name: &str, type_name: &'static str) -> Arc<dyn EntryAdapter<S>>
where
    S: Source + Serialize + DeserializeOwned + 'static,
{
    let profile = ContextProfile::for_context(context_name);
    if let Some(found) = profile.entry_adapters.try_get_registered::<S>() {
        return found;
    }

    EntryAdapterProvider::global().get::<S>(type_name)
}

/// Applies `records` to `entity`: append, then fold, then hooks. See
/// [`apply_and_then`] for the variant with a post-fold callback.
pub async fn apply<E, S>(entity: &mut E, records: Vec<S>, metadata: Metadata) -> Result<(), ApplyFailed<S>>
where
    E: SourcedEntity,
    S: Source + Serialize + DeserializeOwned + 'static,
{
    apply_and_then(entity, records, metadata, |_| {}).await
}

/// The full apply pipeline (spec §4.4):
///
/// 1. `before_apply(records)`.
/// 2. `append_all`/`append_all_with` with `current_version + 1` expected.
/// 3. On success: fold each record in order, incrementing `current_version`,
///    then `after_apply()`, then `and_then`.
/// 4. On failure: `after_apply_failed(err)` decides whether to swallow or
///    re-raise the resulting [`ApplyFailed`].
pub async fn apply_and_then<E, S>(
    entity: &mut E,
    records: Vec<S>,
    metadata: Metadata,
    and_then: impl FnOnce(&mut E),
) -> Result<(), ApplyFailed<S>>
where
    E: SourcedEntity,
    S: Source + Serialize + DeserializeOwned + 'static,
{
    entity.before_apply(records.len());

    let context = entity.context_name().to_owned();
    let snapshot_due = entity.snapshot();

    let Some(journal) = resolve_journal(&context) else {
        let error = StorageError::Failure(format!("journal not bound for context '{context}'"));
        return fail_apply(entity, records, snapshot_due, metadata, error);
    };

    // The resolved adapter must stamp entries with the same symbolic type
    // `register_default` keyed the restore handler under, so `type_name`
    // has to come from `Source::type_name()` (e.g. "AccountOpened"), never
    // `std::any::type_name::<S>()` (the fully-qualified Rust path). An
    // empty batch has no instance to ask, but then nothing gets stamped.
    let type_name = records.first().map_or("", |r| r.type_name());
    let adapter = resolve_entry_adapter::<S>(&context, type_name);
    let stream = entity.stream_name();
    let start_version = entity.current_version() + 1;

    let unsaved: Vec<UnsavedEntry> = records
        .iter()
        .enumerate()
        .map(|(i, r)| adapter.to_entry(r, start_version + i as u64, metadata.clone()))
        .collect();

    let expected = ExpectedVersion::Concrete(start_version);

    let result = match snapshot_due.clone() {
        Some(snapshot) => journal.append_all_with(&stream, expected, unsaved, snapshot).await,
        None => journal.append_all(&stream, expected, unsaved).await,
    };

    match result {
        Ok(_) => {
            let mut version = entity.current_version();
            for record in &records {
                HandlerRegistry::global().fold(entity, record);
                version += 1;
                entity.set_current_version(version);
            }
            entity.after_apply();
            and_then(entity);
            Ok(())
        }
        Err(error) => fail_apply(entity, records, snapshot_due, metadata, error),
    }
}

fn fail_apply<E, S>(
    entity: &mut E,
    records: Vec<S>,
    snapshot: Option<State>,
    metadata: Metadata,
    error: StorageError,
) -> Result<(), ApplyFailed<S>>
where
    E: SourcedEntity,
{
    let should_reraise = entity.after_apply_failed(&error);
    let failed = ApplyFailed {
        records,
        snapshot,
        metadata,
        error,
    };

    if should_reraise {
        Err(failed)
    } else {
        Ok(())
    }
}

/// Restores `entity` from its bound journal (spec §4.4):
///
/// 1. Read the entity's stream.
/// 2. If a snapshot exists, `restore_snapshot` it and skip every entry at
///    or before its `state_version`.
/// 3. Fold the remaining entries via the handler registry, by symbolic
///    type.
/// 4. Set `current_version` to the stream's final version.
pub async fn restore<E: SourcedEntity>(entity: &mut E) -> Result<(), StorageError> {
    let context = entity.context_name().to_owned();
    let journal = resolve_journal(&context)
        .ok_or_else(|| StorageError::Failure(format!("journal not bound for context '{context}'")))?;

    let stream = entity.stream_name();
    let reader = journal.stream_reader(&stream).await;
    let view = reader.read().await;

    let snapshot_version = if let Some(snapshot) = view.snapshot {
        let state_version = snapshot.state_version;
        entity.restore_snapshot(snapshot, view.stream_version);
        state_version
    } else {
        0
    };
    entity.set_current_version(snapshot_version);

    for entry in view.entries.iter().filter(|e| e.stream_version > snapshot_version) {
        HandlerRegistry::global().fold_entry(entity, entry);
    }

    entity.set_current_version(view.stream_version);
    Ok(())
}
