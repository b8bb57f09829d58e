//! Host-injected bindings (spec §6): a generic key/value registry the host
//! wires journals and document stores through, plus the supervision
//! facility fatal errors escalate to.
//!
//! Shaped like [`crate::adapter::provider`]'s type-map registries, but keyed
//! by an arbitrary string rather than a `TypeId`, since the core only ever
//! knows the two well-known keys it owns
//! ([`ContextProfile::journal_key`](crate::adapter::provider::ContextProfile::journal_key),
//! `.document_store_key`) -- everything else is host-defined.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Process-wide registry of host-injected values.
#[derive(Default)]
pub struct HostRegistry {
    values: RwLock<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl HostRegistry {
    /// Returns the process-wide singleton instance.
    pub fn global() -> Arc<HostRegistry> {
        GLOBAL.clone()
    }

    /// Binds `value` under `key`, replacing any prior binding.
    pub fn register_value<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.values.write().insert(key.into(), Box::new(value));
    }

    /// Looks up the value bound under `key`, if any and if it was bound as
    /// type `T`.
    pub fn registered_value<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        self.values
            .read()
            .get(key)
            .and_then(|b| b.downcast_ref::<T>())
            .cloned()
    }

    /// Clears all bindings. For test isolation.
    pub fn reset(&self) {
        self.values.write().clear();
    }
}

/// A directive a [`Supervisor`] may return in response to an escalated
/// fatal error. Opaque to the core (spec §6): nothing here interprets or
/// acts on these directives itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionDirective {
    Resume,
    Restart,
    Stop,
}

/// Facility fatal errors escalate to. The core never recovers from a fatal
/// error on its own; it reports and lets the host decide (spec §7).
pub trait Supervisor: Send + Sync {
    fn escalate(&self, component: &str, error: &anyhow::Error) -> SupervisionDirective;
}

/// A [`Supervisor`] that only logs and always resumes. The default when a
/// host hasn't installed one of its own.
#[derive(Default)]
pub struct LoggingSupervisor;

impl Supervisor for LoggingSupervisor {
    fn escalate(&self, component: &str, error: &anyhow::Error) -> SupervisionDirective {
        #[cfg(feature = "tracing")]
        tracing::error!(component, %error, "escalated to supervisor");

        #[cfg(not(feature = "tracing"))]
        let _ = (component, error);

        SupervisionDirective::Resume
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL: Arc<HostRegistry> = Arc::new(HostRegistry::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_value_round_trips_by_type() {
        let registry = HostRegistry::default();
        registry.register_value("k", Arc::new(42_u32));

        let found = registry.registered_value::<Arc<u32>>("k");
        assert_eq!(found.as_deref().copied(), Some(42));

        assert!(registry.registered_value::<Arc<String>>("k").is_none());
    }

    #[test]
    fn reset_clears_bindings() {
        let registry = HostRegistry::default();
        registry.register_value("k", Arc::new(1_u32));
        registry.reset();
        assert!(registry.registered_value::<Arc<u32>>("k").is_none());
    }

    #[test]
    fn logging_supervisor_always_resumes() {
        let supervisor = LoggingSupervisor;
        let directive = supervisor.escalate("journal", &anyhow::anyhow!("boom"));
        assert_eq!(directive, SupervisionDirective::Resume);
    }
}
