//! Request generation.
//!
//! Computes the outbound lease requests for one machine type per pass:
//! status refreshes for every lease still awaiting fulfillment, plus new
//! requests up to `target_size` when the machine type is enabled. New
//! identifiers and their leases are persisted before the requests are
//! handed to the transport; a crash between persisting and sending is
//! recovered by the next pass resending the same identifiers, which the
//! provider treats as idempotent retries.

use fleet_types::{
    BatchedLeaseRequest, LeaseRequest, MachineLease, MachineTypeId,
};
use tracing::{debug, info};

use crate::config::LeaseManagerConfig;
use crate::error::Result;
use crate::storage::{read_modify_write, MachineTypeStore, Mutation};

/// Requests produced by one generator pass, split by kind.
///
/// No relative ordering is guaranteed between the two kinds; the
/// transport may batch them however it likes.
#[derive(Debug, Clone, Default)]
pub struct GeneratedRequests {
    /// Refreshes for leases still awaiting fulfillment, carrying their
    /// existing identifiers. Emitted regardless of `enabled` so a drained
    /// machine type still resolves its outstanding requests.
    pub status_refreshes: Vec<LeaseRequest>,

    /// Requests for freshly-minted identifiers.
    pub new_machines: Vec<LeaseRequest>,
}

impl GeneratedRequests {
    /// Total number of requests produced.
    pub fn len(&self) -> usize {
        self.status_refreshes.len() + self.new_machines.len()
    }

    /// Whether the pass produced nothing to send.
    pub fn is_empty(&self) -> bool {
        self.status_refreshes.is_empty() && self.new_machines.is_empty()
    }

    /// Collapse into one batch for the transport.
    pub fn into_batch(self) -> BatchedLeaseRequest {
        let mut requests = self.status_refreshes;
        requests.extend(self.new_machines);
        BatchedLeaseRequest { requests }
    }
}

/// Generate the lease requests for one machine type.
///
/// A missing machine type produces no requests: absent configuration is
/// treated as already drained, not as an error. New leases and the
/// advanced identifier counter are committed in the same transaction.
pub async fn generate_lease_requests(
    store: &dyn MachineTypeStore,
    config: &LeaseManagerConfig,
    id: &MachineTypeId,
) -> Result<GeneratedRequests> {
    let generated = read_modify_write(
        store,
        id,
        config.max_txn_attempts,
        config.txn_retry_backoff,
        |record| {
            let mut generated = GeneratedRequests::default();

            for lease in record.leases.iter().filter(|lease| lease.is_pending()) {
                generated.status_refreshes.push(LeaseRequest::new(
                    lease.client_request_id.clone(),
                    record.dimensions.clone(),
                    config.callback_url.clone(),
                ));
            }

            if !record.enabled {
                debug!(machine_type = %record.id, "machine type drained, only refreshing");
                return Mutation::Skip(generated);
            }

            let needed = record.shortfall();
            if needed == 0 {
                return Mutation::Skip(generated);
            }

            for client_request_id in record.allocate_request_ids(needed) {
                let request = LeaseRequest::new(
                    client_request_id,
                    record.dimensions.clone(),
                    config.callback_url.clone(),
                );
                let mut lease = MachineLease::pending(request.client_request_id.clone());
                lease.request_hash = Some(request.request_hash.clone());
                record.leases.push(lease);
                generated.new_machines.push(request);
            }

            Mutation::Write(generated)
        },
    )
    .await?;

    let generated = generated.unwrap_or_default();
    if !generated.is_empty() {
        info!(
            machine_type = %id,
            status_refreshes = generated.status_refreshes.len(),
            new_machines = generated.new_machines.len(),
            "generated lease requests"
        );
    }
    Ok(generated)
}
