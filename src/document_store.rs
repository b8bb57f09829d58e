//! External document-store contract (spec §6).
//!
//! Consumed by user-land projection code, never implemented by the core
//! itself -- the core imposes no storage semantics on read models, only the
//! shape of the contract projections are written against.

use async_trait::async_trait;

use crate::entry::StatePayload;
use crate::error::StorageError;

/// Discriminated outcome of a document-store read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Success,
    Failure,
}

/// Result of a single document read.
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub outcome: ReadOutcome,
    pub state: Option<StatePayload>,
    pub state_version: u64,
}

impl ReadResult {
    pub fn not_found() -> Self {
        Self {
            outcome: ReadOutcome::Failure,
            state: None,
            state_version: 0,
        }
    }

    pub fn found(state: StatePayload, state_version: u64) -> Self {
        Self {
            outcome: ReadOutcome::Success,
            state: Some(state),
            state_version,
        }
    }
}

/// One `(id, type)` pair in a batch [`DocumentStore::read_all`] request.
#[derive(Debug, Clone)]
pub struct ReadBundle {
    pub id: String,
    pub r#type: String,
}

/// External read-model store projections write to. The core does not
/// implement this trait; it is consumed only.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, id: &str, r#type: &str) -> ReadResult;

    async fn read_all(&self, bundles: &[ReadBundle]) -> Vec<ReadResult>;

    async fn write(
        &self,
        id: &str,
        r#type: &str,
        state: StatePayload,
        state_version: u64,
    ) -> Result<(), StorageError>;

    async fn remove(&self, id: &str, r#type: &str) -> Result<(), StorageError>;
}
