//! Tracks pending vs. confirmed projection work (spec §4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::projection::Projectable;

/// Identity key for a projectable, used alongside `Arc` pointer identity.
/// Spec §9's design-notes resolution for implementations without reference
/// equality: `(type, data_id, data_version)`. Used here as the primary key
/// since it also supports lookups from a bare `&dyn Projectable` that may
/// not be the original `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FallbackKey {
    r#type: String,
    data_id: String,
    data_version: u64,
}

impl FallbackKey {
    fn of(p: &dyn Projectable) -> Self {
        Self {
            r#type: p.r#type().to_owned(),
            data_id: p.data_id().to_owned(),
            data_version: p.data_version(),
        }
    }
}

/// Ledger of pending vs. confirmed projection work.
#[derive(Default)]
pub struct Confirmer {
    pending: RwLock<HashMap<FallbackKey, (Arc<dyn Projectable>, Instant)>>,
    confirmed: RwLock<HashMap<FallbackKey, Instant>>,
}

impl Confirmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `p` to pending with the current timestamp. No-op if `p` is
    /// already confirmed.
    pub fn pending(&self, p: Arc<dyn Projectable>) {
        let key = FallbackKey::of(p.as_ref());
        if self.confirmed.read().contains_key(&key) {
            return;
        }

        self.pending
            .write()
            .entry(key)
            .or_insert_with(|| (p, Instant::now()));
    }

    /// Moves `p` from pending to confirmed. No-op if `p` was never pending.
    pub fn confirm(&self, p: &dyn Projectable) {
        let key = FallbackKey::of(p);
        self.pending.write().remove(&key);
        self.confirmed.write().insert(key, Instant::now());
    }

    /// Returns the pending items that have been waiting at least
    /// `threshold`. Recovery (re-dispatch or skip) is host policy (spec
    /// §5).
    pub fn check_unconfirmed(&self, threshold: Duration) -> Vec<Arc<dyn Projectable>> {
        let now = Instant::now();
        self.pending
            .read()
            .values()
            .filter(|(_, since)| now.duration_since(*since) >= threshold)
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn is_pending(&self, p: &dyn Projectable) -> bool {
        self.pending.read().contains_key(&FallbackKey::of(p))
    }

    pub fn is_confirmed(&self, p: &dyn Projectable) -> bool {
        self.confirmed.read().contains_key(&FallbackKey::of(p))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }

    pub fn confirmed_count(&self) -> usize {
        self.confirmed.read().len()
    }

    /// Clears all state. For test isolation.
    pub fn reset(&self) {
        self.pending.write().clear();
        self.confirmed.write().clear();
    }
}
