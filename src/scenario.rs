//! Given/when/then test harness for [`SourcedEntity`]s, adapted from
//! `eventually`'s `Scenario` (`eventually/src/aggregate/test.rs`).
//!
//! The teacher's `Scenario` is purely in-memory: `given` replays envelopes
//! through `Aggregate::apply` directly, and `then` compares the resulting
//! `recorded_events`. Since this crate's entities are journal-backed,
//! `given`/`when` here actually append through [`entity::apply`] against a
//! private, scenario-scoped [`InMemoryJournal`], so the harness exercises
//! the real persistence path rather than bypassing it.

use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::adapter::provider::ContextProfile;
use crate::entity::{self, ApplyFailed, SourcedEntity};
use crate::error::StorageError;
use crate::journal::memory::InMemoryJournal;
use crate::journal::Journal;
use crate::metadata::Metadata;
use crate::registry::HostRegistry;
use crate::source::Source;

static SCENARIO_COUNTER: AtomicU64 = AtomicU64::new(1);

fn fresh_context() -> String {
    format!("scenario-{:x}", SCENARIO_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// A test scenario for a [`SourcedEntity`], built with a given/when/then
/// canvas. Each scenario binds `entity` to a fresh, private context backed
/// by its own [`InMemoryJournal`], so scenarios never interfere with each
/// other or with process-wide registrations.
pub struct Scenario<E> {
    entity: E,
}

impl<E> Scenario<E>
where
    E: SourcedEntity,
{
    /// Starts a scenario for `entity`, binding a fresh in-memory journal
    /// under `entity.context_name()`.
    pub fn for_entity(entity: E) -> Self {
        let profile = ContextProfile::for_context(entity.context_name());
        let journal: Arc<dyn Journal> = Arc::new(InMemoryJournal::new());
        HostRegistry::global().register_value(profile.journal_key(), journal);

        Self { entity }
    }

    /// Specifies the precondition: records already persisted to the
    /// entity's stream before the action under test runs.
    ///
    /// # Panics
    ///
    /// Panics if applying the given records fails -- a scenario's `given`
    /// clause is assumed to always succeed, same as the teacher's
    /// `Scenario::given`.
    pub async fn given<S>(mut self, records: Vec<S>) -> Self
    where
        S: Source + Serialize + DeserializeOwned + 'static,
    {
        if !records.is_empty() {
            entity::apply(&mut self.entity, records, Metadata::empty())
                .await
                .expect("no error is expected when applying domain events from a 'given' clause");
        }

        self
    }

    /// Specifies the action/mutation to execute. `action` is expected to
    /// build its own records and call [`entity::apply`] (or
    /// [`entity::apply_and_then`]), returning the applied records on
    /// success so [`ScenarioThen::then`] can assert on them.
    pub async fn when<S, F, Fut>(mut self, action: F) -> ScenarioThen<E, S>
    where
        F: FnOnce(&mut E) -> Fut,
        Fut: Future<Output = Result<Vec<S>, ApplyFailed<S>>>,
    {
        let result = action(&mut self.entity).await;
        ScenarioThen {
            entity: self.entity,
            result,
        }
    }
}

/// The `then`/`then_error` half of a [`Scenario`].
pub struct ScenarioThen<E, S> {
    entity: E,
    result: Result<Vec<S>, ApplyFailed<S>>,
}

impl<E, S> ScenarioThen<E, S>
where
    E: SourcedEntity,
    S: Debug + PartialEq,
{
    /// Asserts the action succeeded and persisted exactly `expected`
    /// records, in order. Returns the entity for further inspection.
    ///
    /// # Panics
    ///
    /// Panics if the action failed, or persisted a different set of
    /// records than `expected`.
    pub fn then(self, expected: Vec<S>) -> E {
        match self.result {
            Ok(actual) => assert_eq!(actual, expected, "persisted records did not match expectation"),
            Err(failed) => panic!("expected success, action failed with {:?}", failed.error),
        }

        self.entity
    }

    /// Asserts the action failed, returning the entity and the underlying
    /// [`StorageError`] for further inspection.
    ///
    /// # Panics
    ///
    /// Panics if the action succeeded.
    pub fn then_error(self) -> (E, StorageError) {
        match self.result {
            Ok(_) => panic!("expected an error, action succeeded"),
            Err(failed) => (self.entity, failed.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Deposited {
        amount: i64,
    }

    impl Source for Deposited {
        fn created_at(&self) -> i64 {
            0
        }
        fn type_name(&self) -> &'static str {
            "Deposited"
        }
    }

    #[derive(Default)]
    struct Account {
        stream: String,
        context: String,
        version: u64,
        balance: i64,
    }

    impl SourcedEntity for Account {
        fn stream_name(&self) -> String {
            self.stream.clone()
        }
        fn current_version(&self) -> u64 {
            self.version
        }
        fn set_current_version(&mut self, v: u64) {
            self.version = v;
        }
        fn context_name(&self) -> &str {
            &self.context
        }
        fn restore_snapshot(&mut self, _snapshot: crate::entry::State, _stream_version: u64) {}
    }

    fn setup_handlers(context: &str) {
        entity::HandlerRegistry::global().register_default::<Account, Deposited>(
            context,
            "Deposited",
            |account, record| account.balance += record.amount,
        );
    }

    async fn deposit(account: &mut Account, amount: i64) -> Result<Vec<Deposited>, ApplyFailed<Deposited>> {
        let record = Deposited { amount };
        entity::apply(account, vec![record.clone()], Metadata::empty()).await?;
        Ok(vec![record])
    }

    #[tokio::test]
    async fn deposit_onto_a_fresh_account_is_recorded() {
        let context = fresh_context();
        setup_handlers(&context);

        let account = Account {
            stream: "acct-1".into(),
            context,
            ..Default::default()
        };

        let account = Scenario::for_entity(account)
            .given::<Deposited>(vec![])
            .await
            .when(|a| deposit(a, 100))
            .await
            .then(vec![Deposited { amount: 100 }]);

        assert_eq!(account.balance, 100);
        assert_eq!(account.current_version(), 1);
    }

    #[tokio::test]
    async fn deposit_after_a_given_balance_accumulates() {
        let context = fresh_context();
        setup_handlers(&context);

        let account = Account {
            stream: "acct-2".into(),
            context,
            ..Default::default()
        };

        let account = Scenario::for_entity(account)
            .given(vec![Deposited { amount: 50 }])
            .await
            .when(|a| deposit(a, 25))
            .await
            .then(vec![Deposited { amount: 25 }]);

        assert_eq!(account.balance, 75);
    }
}
