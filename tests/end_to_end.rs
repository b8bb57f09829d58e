use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use domo_tactical::adapter::provider::ContextProfile;
use domo_tactical::entity::{self, HandlerRegistry, SourcedEntity};
use domo_tactical::entry::State;
use domo_tactical::journal::memory::InMemoryJournal;
use domo_tactical::journal::Journal;
use domo_tactical::projection::confirmer::Confirmer;
use domo_tactical::projection::consumer::{ConsumerState, JournalConsumer, JournalConsumerConfig};
use domo_tactical::projection::dispatcher::{Dispatcher, MatchableProjections, ProjectionControl};
use domo_tactical::projection::{Projectable, Projection, ProjectToDescription};
use domo_tactical::registry::HostRegistry;
use domo_tactical::source::Source;
use domo_tactical::Metadata;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct AccountOpened;

impl Source for AccountOpened {
    fn created_at(&self) -> i64 {
        0
    }
    fn type_name(&self) -> &'static str {
        "AccountOpened"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct FundsDeposited {
    amount: i64,
}

impl Source for FundsDeposited {
    fn created_at(&self) -> i64 {
        0
    }
    fn type_name(&self) -> &'static str {
        "FundsDeposited"
    }
}

#[derive(Default)]
struct Account {
    stream: String,
    version: u64,
    balance: i64,
    opened: bool,
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
        "bank"
    }
    fn restore_snapshot(&mut self, _snapshot: State, _stream_version: u64) {}
}

struct BalanceProjection {
    hits: Arc<AtomicUsize>,
}

#[async_trait]
impl Projection for BalanceProjection {
    fn name(&self) -> &str {
        "balance-projection"
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

/// Runs the full pipeline end to end: a bound journal, an entity applying
/// and restoring through it, and a consumer dispatching the resulting
/// entries to a registered projection -- exercising the path a host wires
/// together at startup rather than any one module in isolation.
#[tokio::test]
async fn account_lifecycle_flows_through_journal_and_projection() {
    ContextProfile::reset_all();
    HostRegistry::global().reset();
    HandlerRegistry::global().reset();

    let journal = Arc::new(InMemoryJournal::new());
    let profile = ContextProfile::for_context("bank");
    HostRegistry::global().register_value(profile.journal_key(), journal.clone() as Arc<dyn Journal>);

    HandlerRegistry::global().register_default::<Account, AccountOpened>("bank", "AccountOpened", |account, _| {
        account.opened = true;
    });
    HandlerRegistry::global().register_default::<Account, FundsDeposited>(
        "bank",
        "FundsDeposited",
        |account, record| account.balance += record.amount,
    );

    let mut account = Account {
        stream: "acct-42".into(),
        ..Default::default()
    };

    entity::apply(&mut account, vec![AccountOpened], Metadata::empty())
        .await
        .expect("opening an account should succeed");
    entity::apply(
        &mut account,
        vec![FundsDeposited { amount: 100 }, FundsDeposited { amount: 50 }],
        Metadata::empty(),
    )
    .await
    .expect("depositing funds should succeed");

    assert!(account.opened);
    assert_eq!(account.balance, 150);
    assert_eq!(account.current_version(), 3);

    let mut restored = Account {
        stream: "acct-42".into(),
        ..Default::default()
    };
    entity::restore(&mut restored).await.expect("restore should succeed");
    assert_eq!(restored.balance, 150);
    assert_eq!(restored.current_version(), 3);

    let hits = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(MatchableProjections::new());
    registry.register(ProjectToDescription::new(
        Arc::new(BalanceProjection { hits: hits.clone() }),
        vec!["*deposited*".into()],
        "track-deposits",
    ));

    let confirmer = Arc::new(Confirmer::new());
    let dispatcher = Arc::new(Dispatcher::new(registry, confirmer));

    let reader = journal.journal_reader("projector").await;
    // batch_size 1 so each entry is dispatched as its own projectable,
    // keeping the hit count deterministic rather than dependent on how many
    // entries a single poll happens to collect.
    let consumer = JournalConsumer::new(
        reader,
        dispatcher,
        JournalConsumerConfig {
            poll_interval: Duration::from_millis(10),
            batch_size: 1,
        },
    );

    assert_eq!(consumer.state(), ConsumerState::Running);
    let handle = tokio::spawn(consumer.clone().run());

    tokio::time::sleep(Duration::from_millis(300)).await;
    consumer.stop();
    handle.abort();

    // Three entries were appended (one open, two deposits); only the two
    // deposits' symbolic type matches the registered pattern.
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
