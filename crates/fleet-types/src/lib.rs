//! # Fleet Types - Shared Types for Machine-Lease Reconciliation
//!
//! Pure data types shared across the fleet workspace:
//!
//! - The lease ledger aggregate: [`MachineType`] and its embedded
//!   [`MachineLease`] entries, one record per configured machine class.
//! - The provider wire messages: batched [`LeaseRequest`]s going out,
//!   batched [`LeaseResponse`]s coming back, keyed by `client_request_id`.
//!
//! The ledger encodes its own invariants in the type system where it can:
//! a lease's hostname and expiration are carried together inside
//! [`LeaseState::Fulfilled`], so neither can exist without the other, and
//! request identifiers are only minted through
//! [`MachineType::allocate_request_ids`], which advances the persisted
//! monotonic counter.

pub mod machine;
pub mod provider;

pub use machine::{LeaseState, MachineLease, MachineType, MachineTypeId};
pub use provider::{
    BatchedLeaseRequest, BatchedLeaseResponse, Dimensions, LeaseRequest, LeaseRequestError,
    LeaseRequestState, LeaseResponse, OsFamily,
};
