//! Response processing.
//!
//! Applies one batch of provider responses to the ledger, matching by
//! `client_request_id`. Every per-lease failure is absorbed as a ledger
//! transition; the whole batch commits in a single transaction.
//! Re-applying an identical batch is a no-op, so duplicated deliveries
//! from the transport are harmless.

use chrono::{DateTime, Utc};
use fleet_types::{
    BatchedLeaseResponse, LeaseRequestError, LeaseRequestState, LeaseState, MachineTypeId,
};
use tracing::{debug, info, warn};

use crate::config::LeaseManagerConfig;
use crate::error::Result;
use crate::storage::{read_modify_write, MachineTypeStore, Mutation};

/// Tally of what one response batch did to the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Leases now backed by a usable host.
    pub fulfilled: usize,

    /// Leases removed because the provider denied them.
    pub denied: usize,

    /// Leases still queued provider-side; left pending.
    pub untriaged: usize,

    /// Fulfillments dropped because the host arrived without a hostname
    /// or with an expiration already in the past.
    pub unusable: usize,

    /// Leases removed after an identifier collision; a fresh identifier
    /// is minted on the next generator pass.
    pub collided: usize,

    /// Responses reporting a retryable provider error; leases untouched.
    pub transient: usize,

    /// Responses with no matching lease, or carrying neither state nor
    /// error; ignored.
    pub unmatched: usize,
}

impl UpdateOutcome {
    /// Total responses accounted for.
    pub fn total(&self) -> usize {
        self.fulfilled
            + self.denied
            + self.untriaged
            + self.unusable
            + self.collided
            + self.transient
            + self.unmatched
    }

    /// Leases removed from the ledger by this batch.
    pub fn removed(&self) -> usize {
        self.denied + self.unusable + self.collided
    }
}

/// Apply a batch of provider responses to one machine type.
///
/// `now` is the instant fulfillment expirations are validated against.
/// A missing machine type ignores the whole batch and returns the default
/// outcome.
pub async fn update_leases(
    store: &dyn MachineTypeStore,
    config: &LeaseManagerConfig,
    id: &MachineTypeId,
    batch: &BatchedLeaseResponse,
    now: DateTime<Utc>,
) -> Result<UpdateOutcome> {
    let outcome = read_modify_write(
        store,
        id,
        config.max_txn_attempts,
        config.txn_retry_backoff,
        |record| {
            let mut outcome = UpdateOutcome::default();
            let mut changed = false;

            for response in &batch.responses {
                let request_id = response.client_request_id.as_str();
                if record.lease(request_id).is_none() {
                    debug!(machine_type = %record.id, request_id, "response matches no lease");
                    outcome.unmatched += 1;
                    continue;
                }

                // An error code wins over any state in the same response.
                if let Some(error) = response.error {
                    match error {
                        LeaseRequestError::DeadlineExceeded
                        | LeaseRequestError::TransientError => {
                            debug!(
                                machine_type = %record.id,
                                request_id,
                                error = ?error,
                                "transient provider error, leaving lease pending"
                            );
                            outcome.transient += 1;
                        }
                        LeaseRequestError::RequestIdReuse => {
                            warn!(
                                machine_type = %record.id,
                                request_id,
                                "request identifier collision, dropping lease"
                            );
                            record.remove_lease(request_id);
                            outcome.collided += 1;
                            changed = true;
                        }
                    }
                    continue;
                }

                match response.state {
                    Some(LeaseRequestState::Fulfilled) => {
                        match (&response.hostname, response.lease_expiration_ts) {
                            (Some(hostname), Some(expires_at)) if expires_at > now => {
                                let state = LeaseState::Fulfilled {
                                    hostname: hostname.clone(),
                                    expires_at,
                                };
                                if let Some(lease) = record.lease_mut(request_id) {
                                    if lease.state != state
                                        || (response.request_hash.is_some()
                                            && lease.request_hash != response.request_hash)
                                    {
                                        lease.state = state;
                                        if response.request_hash.is_some() {
                                            lease.request_hash = response.request_hash.clone();
                                        }
                                        changed = true;
                                    }
                                }
                                outcome.fulfilled += 1;
                            }
                            _ => {
                                // Fulfilled but never usable: no hostname,
                                // or already lapsed on arrival. Drop the
                                // lease so the slot is re-requested.
                                warn!(
                                    machine_type = %record.id,
                                    request_id,
                                    "unusable fulfillment, dropping lease"
                                );
                                record.remove_lease(request_id);
                                outcome.unusable += 1;
                                changed = true;
                            }
                        }
                    }
                    Some(LeaseRequestState::Denied) => {
                        record.remove_lease(request_id);
                        outcome.denied += 1;
                        changed = true;
                    }
                    Some(LeaseRequestState::Untriaged) => {
                        if let Some(lease) = record.lease_mut(request_id) {
                            if response.request_hash.is_some()
                                && lease.request_hash != response.request_hash
                            {
                                lease.request_hash = response.request_hash.clone();
                                changed = true;
                            }
                        }
                        outcome.untriaged += 1;
                    }
                    None => {
                        outcome.unmatched += 1;
                    }
                }
            }

            if changed {
                Mutation::Write(outcome)
            } else {
                Mutation::Skip(outcome)
            }
        },
    )
    .await?;

    let outcome = outcome.unwrap_or_default();
    if outcome.total() > 0 {
        info!(
            machine_type = %id,
            fulfilled = outcome.fulfilled,
            removed = outcome.removed(),
            untriaged = outcome.untriaged,
            transient = outcome.transient,
            "applied lease response batch"
        );
    }
    Ok(outcome)
}
