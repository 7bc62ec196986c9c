//! Storage trait definition.
//!
//! Defines the interface for machine-type ledger storage backends. Writes
//! are optimistic: every stored record carries a store-managed revision,
//! and a write names the revision it read. Conflicts are surfaced as
//! [`StoreError::RevisionConflict`] and retried by the transaction wrapper
//! in [`crate::storage::txn`], never by callers directly.

use async_trait::async_trait;
use fleet_types::{MachineType, MachineTypeId};
use thiserror::Error;

/// Storage backend errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record changed (or appeared/disappeared) since it was read.
    #[error("revision conflict on machine type {0}")]
    RevisionConflict(MachineTypeId),

    /// The backend itself failed; fatal, propagated to the scheduler.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A stored record together with its store-managed revision.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// Revision the store assigned to this copy of the record.
    pub revision: u64,

    /// The record itself.
    pub record: T,
}

/// Trait for machine-type ledger storage backends.
#[async_trait]
pub trait MachineTypeStore: Send + Sync {
    /// Load a record with its current revision.
    async fn get(&self, id: &MachineTypeId) -> Result<Option<Versioned<MachineType>>, StoreError>;

    /// Write a record, compare-and-swap on its revision.
    ///
    /// `expected = Some(rev)` replaces the record only if the stored
    /// revision still equals `rev`; `expected = None` creates the record
    /// only if it does not exist. Returns the new revision.
    async fn put(
        &self,
        record: &MachineType,
        expected: Option<u64>,
    ) -> Result<u64, StoreError>;

    /// List the identifiers of every stored machine type.
    async fn list_ids(&self) -> Result<Vec<MachineTypeId>, StoreError>;
}
