//! Pattern-matched routing of projectables to projections, with a
//! registration-order cache keyed by the exact cause tuple (spec §4.5).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::projection::confirmer::Confirmer;
use crate::projection::{Projectable, Projection, ProjectToDescription};

/// Registry of [`ProjectToDescription`]s. `register` appends and
/// invalidates the cache; `match_causes` returns (and caches) the distinct
/// matching projections in registration order.
#[derive(Default)]
pub struct MatchableProjections {
    descriptions: RwLock<Vec<ProjectToDescription>>,
    cache: RwLock<HashMap<Vec<String>, Vec<Arc<dyn Projection>>>>,
}

impl MatchableProjections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, description: ProjectToDescription) {
        self.descriptions.write().push(description);
        self.cache.write().clear();
    }

    /// Returns the distinct projections of all descriptions matching
    /// `causes`, preserving registration order (spec §4.5, invariant 8).
    pub fn match_causes(&self, causes: &[String]) -> Vec<Arc<dyn Projection>> {
        if let Some(cached) = self.cache.read().get(causes) {
            return cached.clone();
        }

        let matched = {
            let descriptions = self.descriptions.read();
            let mut seen: HashSet<*const ()> = HashSet::new();
            let mut matched = Vec::new();

            for desc in descriptions.iter() {
                if desc.matches(causes) {
                    let identity = Arc::as_ptr(&desc.projection) as *const ();
                    if seen.insert(identity) {
                        matched.push(desc.projection.clone());
                    }
                }
            }

            matched
        };

        self.cache.write().insert(causes.to_vec(), matched.clone());
        matched
    }

    /// Clears registrations and the cache. For test isolation.
    pub fn reset(&self) {
        self.descriptions.write().clear();
        self.cache.write().clear();
    }
}

/// Per-dispatch control object a [`Projection`] uses to confirm its work or
/// record a failure.
pub struct ProjectionControl {
    confirmer: Arc<Confirmer>,
    error_handler: Option<Arc<dyn Fn(&anyhow::Error) + Send + Sync>>,
}

impl ProjectionControl {
    pub fn new(confirmer: Arc<Confirmer>) -> Self {
        Self {
            confirmer,
            error_handler: None,
        }
    }

    #[must_use]
    pub fn with_error_handler(mut self, handler: impl Fn(&anyhow::Error) + Send + Sync + 'static) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn confirm_projected(&self, projectable: &dyn Projectable) {
        self.confirmer.confirm(projectable);
    }

    pub fn error(&self, e: &anyhow::Error) {
        if let Some(handler) = &self.error_handler {
            handler(e);
        }
    }
}

/// Routes a [`Projectable`] to every [`Projection`] whose patterns match its
/// `because_of` causes (spec §4.5).
///
/// Reference supervision policy: continue on error, logged by supervisor; a
/// projectable remains pending unless all matching projections confirm it.
pub struct Dispatcher {
    projections: Arc<MatchableProjections>,
    confirmer: Arc<Confirmer>,
    control: ProjectionControl,
}

impl Dispatcher {
    pub fn new(projections: Arc<MatchableProjections>, confirmer: Arc<Confirmer>) -> Self {
        let control = ProjectionControl::new(confirmer.clone());
        Self {
            projections,
            confirmer,
            control,
        }
    }

    pub async fn dispatch(&self, projectable: Arc<dyn Projectable>) {
        self.confirmer.pending(projectable.clone());

        let matches = self.projections.match_causes(projectable.because_of());
        if matches.is_empty() {
            return;
        }

        for projection in matches {
            if let Err(e) = projection.project_with(projectable.as_ref(), &self.control).await {
                #[cfg(feature = "tracing")]
                tracing::error!(projection = projection.name(), error = %e, "projection failed, continuing");

                self.control.error(&e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Stub {
        data_id: String,
        because_of: Vec<String>,
    }

    impl Projectable for Stub {
        fn data_id(&self) -> &str {
            &self.data_id
        }
        fn data_version(&self) -> u64 {
            1
        }
        fn r#type(&self) -> &str {
            "Account"
        }
        fn type_version(&self) -> u32 {
            1
        }
        fn because_of(&self) -> &[String] {
            &self.because_of
        }
    }

    struct CountingProjection {
        hits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Projection for CountingProjection {
        fn name(&self) -> &str {
            "counting"
        }

        async fn project_with(
            &self,
            projectable: &dyn Projectable,
            control: &ProjectionControl,
        ) -> Result<(), anyhow::Error> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            control.confirm_projected(projectable);
            Ok(())
        }
    }

    #[tokio::test]
    async fn s5_fan_out_delivers_to_every_matching_projection_once() {
        let exact_hits = Arc::new(AtomicUsize::new(0));
        let wild_hits = Arc::new(AtomicUsize::new(0));
        let new_hits = Arc::new(AtomicUsize::new(0));

        let registry = Arc::new(MatchableProjections::new());
        registry.register(ProjectToDescription::new(
            Arc::new(CountingProjection { hits: exact_hits.clone() }),
            vec!["AccountOpened".into(), "FundsDeposited".into(), "FundsWithdrawn".into()],
            "P_exact",
        ));
        registry.register(ProjectToDescription::new(
            Arc::new(CountingProjection { hits: wild_hits.clone() }),
            vec!["Account*".into(), "Transfer*".into()],
            "P_wild",
        ));
        registry.register(ProjectToDescription::new(
            Arc::new(CountingProjection { hits: new_hits.clone() }),
            vec!["AccountOpened".into()],
            "P_new",
        ));

        let confirmer = Arc::new(Confirmer::new());
        let dispatcher = Dispatcher::new(registry, confirmer.clone());

        for (id, cause) in [("1", "AccountOpened"), ("2", "FundsDeposited"), ("3", "TransferStarted")] {
            let projectable: Arc<dyn Projectable> = Arc::new(Stub {
                data_id: id.into(),
                because_of: vec![cause.into()],
            });
            dispatcher.dispatch(projectable).await;
        }

        assert_eq!(exact_hits.load(Ordering::SeqCst), 2);
        assert_eq!(wild_hits.load(Ordering::SeqCst), 2);
        assert_eq!(new_hits.load(Ordering::SeqCst), 1);
        assert_eq!(confirmer.confirmed_count(), 3);
        assert_eq!(confirmer.pending_count(), 0);
    }

    #[tokio::test]
    async fn unmatched_projectable_stays_pending() {
        let registry = Arc::new(MatchableProjections::new());
        let confirmer = Arc::new(Confirmer::new());
        let dispatcher = Dispatcher::new(registry, confirmer.clone());

        let projectable: Arc<dyn Projectable> = Arc::new(Stub {
            data_id: "1".into(),
            because_of: vec!["Unmatched".into()],
        });
        dispatcher.dispatch(projectable).await;

        assert_eq!(confirmer.pending_count(), 1);
        assert_eq!(confirmer.confirmed_count(), 0);
    }
}
