//! The lease ledger aggregate.
//!
//! One [`MachineType`] record exists per configured machine class. It owns
//! the full lease bookkeeping state for that class: the outstanding
//! [`MachineLease`] entries, the monotonic request-identifier counter, and
//! the set of hostnames queued for registration cleanup.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::Dimensions;

/// Stable configuration key identifying a machine class.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MachineTypeId(String);

impl MachineTypeId {
    /// Create an identifier from a configuration key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MachineTypeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Fulfillment state of a single lease.
///
/// Hostname and expiration travel together: a lease either has neither
/// (still awaiting fulfillment) or both (backed by a concrete host).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaseState {
    /// Sent to the provider, not yet resolved.
    Pending,

    /// Backed by a concrete host until `expires_at`.
    Fulfilled {
        /// Hostname of the leased machine.
        hostname: String,
        /// Instant at which the lease lapses.
        expires_at: DateTime<Utc>,
    },
}

impl LeaseState {
    /// Hostname of the backing machine, if fulfilled.
    pub fn hostname(&self) -> Option<&str> {
        match self {
            LeaseState::Pending => None,
            LeaseState::Fulfilled { hostname, .. } => Some(hostname),
        }
    }

    /// Whether the lease is still awaiting fulfillment.
    pub fn is_pending(&self) -> bool {
        matches!(self, LeaseState::Pending)
    }
}

/// One outstanding or fulfilled request for a machine.
///
/// Owned exclusively by its parent [`MachineType`]; identified by
/// `client_request_id`, which is never reused for that machine type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineLease {
    /// Globally-unique request identifier, `<request_id_base>-<n>`.
    pub client_request_id: String,

    /// Fingerprint of the exact request payload, echoed by the provider.
    pub request_hash: Option<String>,

    /// Current fulfillment state.
    pub state: LeaseState,
}

impl MachineLease {
    /// A freshly-minted lease awaiting fulfillment.
    pub fn pending(client_request_id: impl Into<String>) -> Self {
        Self {
            client_request_id: client_request_id.into(),
            request_hash: None,
            state: LeaseState::Pending,
        }
    }

    /// Whether the lease is still awaiting fulfillment.
    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }

    /// Whether the lease is fulfilled and has lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match &self.state {
            LeaseState::Pending => false,
            LeaseState::Fulfilled { expires_at, .. } => *expires_at <= now,
        }
    }
}

/// Root aggregate: lease bookkeeping for one configured machine class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineType {
    /// Stable configuration key.
    pub id: MachineTypeId,

    /// When false, no new leases are requested; pending ones are still
    /// polled and retried until they resolve.
    pub enabled: bool,

    /// Desired concurrent lease count.
    pub target_size: usize,

    /// Prefix from which request identifiers are derived.
    pub request_id_base: String,

    /// Monotonic identifier counter. Never decremented, even across
    /// process restarts; persisted in the same transaction as the leases
    /// it names.
    pub request_count: u64,

    /// Capability descriptor sent with every request for this class.
    pub dimensions: Dimensions,

    /// Outstanding and fulfilled leases, unique by `client_request_id`.
    pub leases: Vec<MachineLease>,

    /// Hostnames awaiting registration cleanup.
    pub pending_deletion: BTreeSet<String>,
}

impl MachineType {
    /// Create an enabled machine type with no leases.
    pub fn new(
        id: impl Into<MachineTypeId>,
        request_id_base: impl Into<String>,
        target_size: usize,
        dimensions: Dimensions,
    ) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            target_size,
            request_id_base: request_id_base.into(),
            request_count: 0,
            dimensions,
            leases: Vec::new(),
            pending_deletion: BTreeSet::new(),
        }
    }

    /// Allocate `count` fresh request identifiers.
    ///
    /// Returns the contiguous range `<base>-<n+1> ..= <base>-<n+count>`
    /// and advances `request_count`. This is the only way identifiers are
    /// minted; callers must persist the mutated record in the same
    /// transaction as the leases built from the returned identifiers.
    pub fn allocate_request_ids(&mut self, count: usize) -> Vec<String> {
        (0..count)
            .map(|_| {
                self.request_count += 1;
                format!("{}-{}", self.request_id_base, self.request_count)
            })
            .collect()
    }

    /// Look up a lease by its request identifier.
    pub fn lease(&self, client_request_id: &str) -> Option<&MachineLease> {
        self.leases
            .iter()
            .find(|lease| lease.client_request_id == client_request_id)
    }

    /// Look up a lease mutably by its request identifier.
    pub fn lease_mut(&mut self, client_request_id: &str) -> Option<&mut MachineLease> {
        self.leases
            .iter_mut()
            .find(|lease| lease.client_request_id == client_request_id)
    }

    /// Remove a lease by its request identifier, returning it if present.
    pub fn remove_lease(&mut self, client_request_id: &str) -> Option<MachineLease> {
        let index = self
            .leases
            .iter()
            .position(|lease| lease.client_request_id == client_request_id)?;
        Some(self.leases.remove(index))
    }

    /// How many leases are missing relative to `target_size`.
    pub fn shortfall(&self) -> usize {
        self.target_size.saturating_sub(self.leases.len())
    }
}
