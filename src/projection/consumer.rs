//! Polls a named [`JournalReader`] and feeds the dispatcher (spec §4.5).
//!
//! Grounded in `eventually-postgres::subscriber`
//! (`eventually-postgres/src/subscriber.rs`), whose background
//! `tokio::spawn` loop polls for new rows on an interval; this consumer
//! generalizes that to an in-process `JournalReader` and adds the
//! pause/resume/stop lifecycle spec §4.5 names explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time;

use crate::journal::JournalReader;
use crate::projection::dispatcher::Dispatcher;
use crate::projection::EntryBatchProjectable;

/// `poll_interval`/`batch_size` configuration (spec §4.5).
#[derive(Debug, Clone, Copy)]
pub struct JournalConsumerConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
}

impl Default for JournalConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            batch_size: 10,
        }
    }
}

/// The consumer's lifecycle (spec §4.5). Initial state is `Running`.
/// `pause` is legal from `Running`, `resume` from `Paused`, `stop` from any
/// state (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Running,
    Paused,
    Stopped,
}

/// Polls a [`JournalReader`] on a fixed interval, wraps each non-empty
/// batch as a [`EntryBatchProjectable`], and dispatches it.
///
/// The reader's position only advances past entries that were actually
/// handed to `read_next`; a batch that's read but whose dispatch the host
/// later decides to skip still has its position committed, per spec §4.5's
/// "position reflects the last fully dispatched batch" -- with the caveat
/// that in this implementation dispatch never itself fails (projection
/// errors are recorded on the control, not propagated), so "read" and
/// "fully dispatched" coincide.
pub struct JournalConsumer {
    reader: Arc<dyn JournalReader>,
    dispatcher: Arc<Dispatcher>,
    config: JournalConsumerConfig,
    state: RwLock<ConsumerState>,
    dispatched_batches: AtomicU64,
}

impl JournalConsumer {
    pub fn new(
        reader: Arc<dyn JournalReader>,
        dispatcher: Arc<Dispatcher>,
        config: JournalConsumerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            reader,
            dispatcher,
            config,
            state: RwLock::new(ConsumerState::Running),
            dispatched_batches: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConsumerState::Running
    }

    /// Halts polling. The consumer reacts at the next poll boundary, not
    /// mid-batch (spec §5).
    pub fn pause(&self) {
        let mut state = self.state.write();
        if *state == ConsumerState::Running {
            *state = ConsumerState::Paused;
        }
    }

    /// Restarts polling.
    pub fn resume(&self) {
        let mut state = self.state.write();
        if *state == ConsumerState::Paused {
            *state = ConsumerState::Running;
        }
    }

    /// Stops permanently, from any state.
    pub fn stop(&self) {
        *self.state.write() = ConsumerState::Stopped;
    }

    /// Number of non-empty batches dispatched so far. Diagnostic only.
    pub fn dispatched_batches(&self) -> u64 {
        self.dispatched_batches.load(Ordering::Relaxed)
    }

    /// Runs the polling loop until [`JournalConsumer::stop`] is called.
    /// Intended to be spawned onto the host runtime:
    /// `tokio::spawn(consumer.clone().run())`.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.state() {
                ConsumerState::Stopped => return,
                ConsumerState::Paused => {
                    time::sleep(self.config.poll_interval).await;
                    continue;
                }
                ConsumerState::Running => {}
            }

            let batch = self.reader.read_next(self.config.batch_size).await;
            if !batch.is_empty() {
                let projectable = Arc::new(EntryBatchProjectable::from_entries(batch));
                self.dispatcher.dispatch(projectable).await;
                self.dispatched_batches.fetch_add(1, Ordering::Relaxed);
            }

            time::sleep(self.config.poll_interval).await;
        }
    }
}
