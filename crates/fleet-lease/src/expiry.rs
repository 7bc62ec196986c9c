//! Expiry reaping.
//!
//! Detects fulfilled leases whose expiration has lapsed and moves their
//! hostnames into the machine type's deletion queue. Pure in-memory
//! operation: the caller persists the mutated record, and may batch the
//! reap with other mutations in the same transaction.

use chrono::{DateTime, Utc};
use fleet_types::{LeaseState, MachineType};
use tracing::debug;

/// Move every lapsed lease's hostname into `pending_deletion`.
///
/// A lease is lapsed when it is fulfilled and its expiration is at or
/// before `now`. Pending leases and fulfillments still in the future are
/// untouched. Returns the hostnames moved; a second pass over the same
/// record is a no-op.
pub fn reap_expired_leases(machine_type: &mut MachineType, now: DateTime<Utc>) -> Vec<String> {
    let mut reaped = Vec::new();

    machine_type.leases.retain(|lease| {
        if !lease.is_expired(now) {
            return true;
        }
        if let LeaseState::Fulfilled { hostname, .. } = &lease.state {
            debug!(
                machine_type = %machine_type.id,
                request_id = %lease.client_request_id,
                hostname = %hostname,
                "lease lapsed, queueing host for deletion"
            );
            reaped.push(hostname.clone());
        }
        false
    });

    for hostname in &reaped {
        machine_type.pending_deletion.insert(hostname.clone());
    }
    reaped
}
