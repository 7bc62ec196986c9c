//! Error types for the lease reconciliation core.
//!
//! Per-lease provider failures never appear here: denials, identifier
//! collisions, and transient errors are absorbed as ledger-state
//! transitions, and a failed bot-registration delete just leaves the
//! hostname queued for the next pass. Only fatal persistence conditions
//! propagate to the scheduler.

use fleet_types::MachineTypeId;
use thiserror::Error;

use crate::storage::StoreError;

/// Errors that can occur during a reconciliation pass.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// The underlying ledger store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A transaction kept losing to concurrent writers and exhausted its
    /// retry budget.
    #[error("transaction contention on machine type {machine_type} after {attempts} attempts")]
    TransactionContention {
        /// Machine type whose record was contended.
        machine_type: MachineTypeId,
        /// Attempts made before giving up.
        attempts: u32,
    },
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, LeaseError>;
