//! Lease Manager - facade over the reconciliation passes.
//!
//! One entry point per external trigger: the periodic scheduler calls
//! each of [`LeaseManager::generate_lease_requests`],
//! [`LeaseManager::update_leases`], [`LeaseManager::reap_expired`], and
//! [`LeaseManager::clean_up_bots`] on its own cadence. Machine types are
//! independent; entry points for different machine types may run in
//! parallel, and entry points for the same machine type interleave safely
//! because every mutation goes through a single-entity transaction.

use std::sync::Arc;

use chrono::Utc;
use fleet_types::{BatchedLeaseResponse, MachineTypeId};
use tokio::sync::broadcast;
use tracing::instrument;

use crate::cleanup::{clean_up_bots, BotRegistry, CleanupOutcome};
use crate::config::LeaseManagerConfig;
use crate::error::Result;
use crate::expiry::reap_expired_leases;
use crate::requests::{generate_lease_requests, GeneratedRequests};
use crate::responses::{update_leases, UpdateOutcome};
use crate::storage::{read_modify_write, MachineTypeStore, Mutation};

/// Events emitted by the lease manager.
#[derive(Debug, Clone)]
pub enum LeaseEvent {
    /// A generator pass produced outbound requests.
    RequestsGenerated {
        machine_type: MachineTypeId,
        new_machines: usize,
        status_refreshes: usize,
    },

    /// A response batch was applied to the ledger.
    LeasesUpdated {
        machine_type: MachineTypeId,
        fulfilled: usize,
        removed: usize,
    },

    /// Lapsed leases were moved to the deletion queue.
    LeasesReaped {
        machine_type: MachineTypeId,
        hostnames: Vec<String>,
    },

    /// A cleanup pass over all machine types finished.
    BotsCleaned { deleted: usize, failed: usize },
}

/// Facade over the four reconciliation passes.
pub struct LeaseManager {
    /// Configuration.
    config: LeaseManagerConfig,

    /// Ledger storage.
    store: Arc<dyn MachineTypeStore>,

    /// Bot-registration store.
    registry: Arc<dyn BotRegistry>,

    /// Event broadcaster.
    event_tx: broadcast::Sender<LeaseEvent>,
}

impl LeaseManager {
    /// Create a new lease manager.
    pub fn new(
        config: LeaseManagerConfig,
        store: Arc<dyn MachineTypeStore>,
        registry: Arc<dyn BotRegistry>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            config,
            store,
            registry,
            event_tx,
        }
    }

    /// Subscribe to lease events.
    pub fn subscribe(&self) -> broadcast::Receiver<LeaseEvent> {
        self.event_tx.subscribe()
    }

    /// Generate this pass's outbound requests for one machine type.
    #[instrument(skip(self), fields(machine_type = %id))]
    pub async fn generate_lease_requests(
        &self,
        id: &MachineTypeId,
    ) -> Result<GeneratedRequests> {
        let generated = generate_lease_requests(self.store.as_ref(), &self.config, id).await?;
        if !generated.is_empty() {
            self.emit_event(LeaseEvent::RequestsGenerated {
                machine_type: id.clone(),
                new_machines: generated.new_machines.len(),
                status_refreshes: generated.status_refreshes.len(),
            });
        }
        Ok(generated)
    }

    /// Apply a batch of provider responses to one machine type.
    #[instrument(skip(self, batch), fields(machine_type = %id, responses = batch.responses.len()))]
    pub async fn update_leases(
        &self,
        id: &MachineTypeId,
        batch: &BatchedLeaseResponse,
    ) -> Result<UpdateOutcome> {
        let outcome =
            update_leases(self.store.as_ref(), &self.config, id, batch, Utc::now()).await?;
        if outcome.total() > 0 {
            self.emit_event(LeaseEvent::LeasesUpdated {
                machine_type: id.clone(),
                fulfilled: outcome.fulfilled,
                removed: outcome.removed(),
            });
        }
        Ok(outcome)
    }

    /// Reap lapsed leases for one machine type and persist the result.
    ///
    /// Returns the hostnames moved into the deletion queue; empty for a
    /// machine type with nothing lapsed, or one that no longer exists.
    #[instrument(skip(self), fields(machine_type = %id))]
    pub async fn reap_expired(&self, id: &MachineTypeId) -> Result<Vec<String>> {
        let now = Utc::now();
        let reaped = read_modify_write(
            self.store.as_ref(),
            id,
            self.config.max_txn_attempts,
            self.config.txn_retry_backoff,
            |record| {
                let reaped = reap_expired_leases(record, now);
                if reaped.is_empty() {
                    Mutation::Skip(reaped)
                } else {
                    Mutation::Write(reaped)
                }
            },
        )
        .await?
        .unwrap_or_default();

        if !reaped.is_empty() {
            self.emit_event(LeaseEvent::LeasesReaped {
                machine_type: id.clone(),
                hostnames: reaped.clone(),
            });
        }
        Ok(reaped)
    }

    /// Drain the deletion queues of every machine type.
    #[instrument(skip(self))]
    pub async fn clean_up_bots(&self) -> Result<CleanupOutcome> {
        let outcome = clean_up_bots(self.store.as_ref(), &self.registry, &self.config).await?;
        if outcome.deleted > 0 || outcome.failed > 0 {
            self.emit_event(LeaseEvent::BotsCleaned {
                deleted: outcome.deleted,
                failed: outcome.failed,
            });
        }
        Ok(outcome)
    }

    fn emit_event(&self, event: LeaseEvent) {
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }
}
