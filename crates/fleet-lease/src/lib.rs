//! # Fleet Lease - Machine-Lease Reconciliation Core
//!
//! Converges a desired fleet size of leased machines against the set of
//! leases actually held from an external machine provider, safely under
//! partial failure, latency, and at-most-once delivery.
//!
//! ## Overview
//!
//! Four individually-triggered, individually-transactional passes operate
//! on one [`fleet_types::MachineType`] ledger record per machine class:
//!
//! - **Request generation** ([`requests`]): status refreshes for
//!   unresolved leases plus new requests up to `target_size`, minting
//!   identifiers from a persisted monotonic counter.
//! - **Response processing** ([`responses`]): applies a provider response
//!   batch to the ledger; denials, collisions, and unusable fulfillments
//!   become lease removals, transient errors leave leases pending.
//! - **Expiry reaping** ([`expiry`]): moves lapsed hostnames into the
//!   deletion queue.
//! - **Bot cleanup** ([`cleanup`]): deletes bot registrations and clears
//!   confirmed hostnames from the queue under a transaction.
//!
//! The passes interleave safely in any order and are safe to re-run after
//! a crash: identifiers are persisted before requests are considered
//! sent, response application is idempotent, and every mutation is a
//! bounded-retry compare-and-swap against the [`storage`] seam.
//!
//! ## Architectural Boundaries
//!
//! The web/cron dispatch layer, the configuration loader that maintains
//! `MachineType` records, the provider RPC transport, and the
//! bot-registration store all live outside this crate, behind the
//! [`storage::MachineTypeStore`] and [`cleanup::BotRegistry`] traits and
//! the request/response types in `fleet-types`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleet_lease::{
//!     cleanup::MockBotRegistry, config::LeaseManagerConfig,
//!     manager::LeaseManager, storage::InMemoryMachineTypeStore,
//! };
//! use fleet_types::{Dimensions, MachineType, MachineTypeId, OsFamily};
//!
//! # async fn example() -> fleet_lease::error::Result<()> {
//! let store = Arc::new(InMemoryMachineTypeStore::new());
//! store.seed(MachineType::new(
//!     "linux-small",
//!     "linux-small",
//!     4,
//!     Dimensions::os(OsFamily::Linux),
//! ));
//!
//! let manager = LeaseManager::new(
//!     LeaseManagerConfig::with_callback_url("https://swarming.example.com"),
//!     store,
//!     Arc::new(MockBotRegistry::new()),
//! );
//!
//! let generated = manager
//!     .generate_lease_requests(&MachineTypeId::from("linux-small"))
//!     .await?;
//! println!("sending {} requests", generated.len());
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod config;
pub mod error;
pub mod expiry;
pub mod manager;
pub mod requests;
pub mod responses;
pub mod storage;

pub use cleanup::{BotRegistry, CleanupOutcome, MockBotRegistry, RegistryError};
pub use config::LeaseManagerConfig;
pub use error::{LeaseError, Result};
pub use expiry::reap_expired_leases;
pub use manager::{LeaseEvent, LeaseManager};
pub use requests::{generate_lease_requests, GeneratedRequests};
pub use responses::{update_leases, UpdateOutcome};
pub use storage::{InMemoryMachineTypeStore, MachineTypeStore, StoreError, Versioned};
