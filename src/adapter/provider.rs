//! Context-scoped adapter registries with a global fallback (spec §4.2).
//!
//! Modeled as a small type-map, the same trick the teacher reaches for
//! whenever it needs a heterogeneous registry keyed by a generic parameter
//! (see `eventually-core`'s per-`Aggregate` handler tables, conceptually).
//! Registration is a host-startup-time activity; lookups are hot-path and
//! therefore backed by `parking_lot::RwLock` rather than `tokio::sync`.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::adapter::{EntryAdapter, JsonEntryAdapter, StateAdapter};
use crate::source::Source;

type AnyMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// Process-wide singleton registry of [`EntryAdapter`]s, keyed by the Rust
/// type of the record they serialize.
#[derive(Default)]
pub struct EntryAdapterProvider {
    adapters: RwLock<AnyMap>,
}

impl EntryAdapterProvider {
    /// Returns the process-wide singleton instance.
    pub fn global() -> Arc<EntryAdapterProvider> {
        GLOBAL_ENTRY.clone()
    }

    /// Registers an adapter for record type `S`.
    pub fn register<S>(&self, adapter: impl EntryAdapter<S> + 'static)
    where
        S: Source + 'static,
    {
        let boxed: Arc<dyn EntryAdapter<S>> = Arc::new(adapter);
        self.adapters
            .write()
            .insert(TypeId::of::<S>(), Box::new(boxed));
    }

    /// Looks up the adapter registered for `S`, falling back to a default
    /// JSON adapter at version 1 if none was registered.
    pub fn get<S>(&self, type_name: &'static str) -> Arc<dyn EntryAdapter<S>>
    where
        S: Source + serde::Serialize + serde::de::DeserializeOwned + 'static,
    {
        if let Some(found) = self
            .adapters
            .read()
            .get(&TypeId::of::<S>())
            .and_then(|b| b.downcast_ref::<Arc<dyn EntryAdapter<S>>>())
        {
            return found.clone();
        }

        Arc::new(JsonEntryAdapter::<S>::new(1, type_name))
    }

    /// Looks up an explicitly registered adapter for `S`, without falling
    /// back to a default. Used by context resolution (spec §4.4) to decide
    /// whether a context profile overrides the global provider.
    pub fn try_get_registered<S>(&self) -> Option<Arc<dyn EntryAdapter<S>>>
    where
        S: Source + 'static,
    {
        self.adapters
            .read()
            .get(&TypeId::of::<S>())
            .and_then(|b| b.downcast_ref::<Arc<dyn EntryAdapter<S>>>())
            .cloned()
    }

    /// Clears all registrations. For test isolation.
    pub fn reset(&self) {
        self.adapters.write().clear();
    }
}

/// Process-wide singleton registry of [`StateAdapter`]s, keyed by the Rust
/// type of the aggregate state they serialize.
#[derive(Default)]
pub struct StateAdapterProvider {
    adapters: RwLock<AnyMap>,
}

impl StateAdapterProvider {
    pub fn global() -> Arc<StateAdapterProvider> {
        GLOBAL_STATE.clone()
    }

    pub fn register<S>(&self, adapter: impl StateAdapter<S> + 'static)
    where
        S: 'static,
    {
        let boxed: Arc<dyn StateAdapter<S>> = Arc::new(adapter);
        self.adapters
            .write()
            .insert(TypeId::of::<S>(), Box::new(boxed));
    }

    /// Looks up the adapter registered for `S`. Unlike the entry provider,
    /// there is no sensible state-agnostic default, so callers must
    /// register one explicitly; returns `None` otherwise.
    pub fn try_get<S>(&self) -> Option<Arc<dyn StateAdapter<S>>>
    where
        S: 'static,
    {
        self.adapters
            .read()
            .get(&TypeId::of::<S>())
            .and_then(|b| b.downcast_ref::<Arc<dyn StateAdapter<S>>>())
            .cloned()
    }

    pub fn reset(&self) {
        self.adapters.write().clear();
    }
}

/// A named namespace binding a logical bounded context to its own adapter
/// registries and a journal-key convention (`domo-tactical:<context>.journal`).
pub struct ContextProfile {
    pub name: String,
    pub entry_adapters: EntryAdapterProvider,
    pub state_adapters: StateAdapterProvider,
}

impl ContextProfile {
    fn new(name: String) -> Self {
        Self {
            name,
            entry_adapters: EntryAdapterProvider::default(),
            state_adapters: StateAdapterProvider::default(),
        }
    }

    /// Returns the journal registry key this context's journal is bound
    /// under in the host registry (spec §3, §4.4).
    pub fn journal_key(&self) -> String {
        format!("domo-tactical:{}.journal", self.name)
    }

    /// Returns the document-store registry key for this context.
    pub fn document_store_key(&self) -> String {
        format!("domo-tactical:{}.documentStore", self.name)
    }

    /// Returns the (idempotent) profile for the given context name: the
    /// same `Arc` is returned for repeated calls with the same name.
    pub fn for_context(name: impl Into<String>) -> Arc<ContextProfile> {
        let name = name.into();
        let mut profiles = PROFILES.write();
        profiles
            .entry(name.clone())
            .or_insert_with(|| Arc::new(ContextProfile::new(name)))
            .clone()
    }

    /// Fluent registration of an entry adapter (spec §4.2 `register(Type,
    /// transforms?)`). An adapter with property transforms applied is built
    /// with [`crate::adapter::JsonEntryAdapter::with_transforms`] before
    /// being passed in here.
    pub fn register<S>(&self, adapter: impl EntryAdapter<S> + 'static) -> &Self
    where
        S: Source + 'static,
    {
        self.entry_adapters.register(adapter);
        self
    }

    /// Registers the default JSON adapter (version 1, no upcasts) for `S`
    /// under `type_name` -- shorthand for callers who only need the
    /// convention adapter and not a custom [`EntryAdapter`] impl.
    pub fn register_source<S>(&self, type_name: &'static str) -> &Self
    where
        S: Source + serde::Serialize + serde::de::DeserializeOwned + 'static,
    {
        self.entry_adapters.register(JsonEntryAdapter::<S>::new(1, type_name));
        self
    }

    /// Fluent, multi-call registration (spec §4.2 `register_all(...)`).
    ///
    /// The original source passes a heterogeneous list of classes to a
    /// single variadic call; Rust's generics erase that option away, since
    /// each `register::<S>` call is monomorphized for a distinct `S`. `f`
    /// is the idiomatic stand-in: it receives `&self` so several
    /// differently-typed `register`/`register_source` calls can still be
    /// chained in one expression.
    #[must_use]
    pub fn register_all(&self, f: impl FnOnce(&Self)) -> &Self {
        f(self);
        self
    }

    /// Fluent, multi-call registration of default-adapter-only source types
    /// (spec §4.2 `register_sources([...])`); same type-erasure rationale
    /// as [`ContextProfile::register_all`], built from
    /// [`ContextProfile::register_source`] instead of [`ContextProfile::register`].
    #[must_use]
    pub fn register_sources(&self, f: impl FnOnce(&Self)) -> &Self {
        f(self);
        self
    }

    /// Clears all profiles. For test isolation.
    pub fn reset_all() {
        PROFILES.write().clear();
    }
}

const DEFAULT_CONTEXT: &str = "default";

/// Returns the profile for the default (unnamed) bounded context.
pub fn default_context() -> Arc<ContextProfile> {
    ContextProfile::for_context(DEFAULT_CONTEXT)
}

lazy_static::lazy_static! {
    static ref GLOBAL_ENTRY: Arc<EntryAdapterProvider> = Arc::new(EntryAdapterProvider::default());
    static ref GLOBAL_STATE: Arc<StateAdapterProvider> = Arc::new(StateAdapterProvider::default());
    static ref PROFILES: RwLock<HashMap<String, Arc<ContextProfile>>> = RwLock::new(HashMap::new());
}
