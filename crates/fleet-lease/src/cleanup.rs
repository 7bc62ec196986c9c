//! Bot-registration cleanup.
//!
//! Drains each machine type's deletion queue in two phases: delete the
//! bot registration from the registration store, then subtract only the
//! confirmed hostnames from the stored queue under a transaction. The
//! re-read inside the transaction means hostnames queued by a concurrent
//! expiry pass between our read and the delete RPC are never lost.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use fleet_types::MachineTypeId;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LeaseManagerConfig;
use crate::error::Result;
use crate::storage::{read_modify_write, MachineTypeStore, Mutation};

/// Registration-store errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The delete RPC failed; the hostname stays queued for the next pass.
    #[error("registry backend error: {0}")]
    Backend(String),
}

/// Client trait for the bot-registration store.
#[async_trait]
pub trait BotRegistry: Send + Sync {
    /// Delete the registration for `hostname`.
    ///
    /// Deleting a hostname with no registration succeeds: a missing
    /// registration means the cleanup already happened.
    async fn delete_bot(&self, hostname: &str) -> std::result::Result<(), RegistryError>;
}

/// Tally of one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Registrations confirmed deleted and cleared from their queues.
    pub deleted: usize,

    /// Delete RPCs that failed; their hostnames remain queued.
    pub failed: usize,
}

/// Delete queued bot registrations for every machine type.
///
/// Per-hostname RPC failures are absorbed: the hostname stays in
/// `pending_deletion` and the next pass retries it. Only store failures
/// propagate.
pub async fn clean_up_bots(
    store: &dyn MachineTypeStore,
    registry: &Arc<dyn BotRegistry>,
    config: &LeaseManagerConfig,
) -> Result<CleanupOutcome> {
    let mut outcome = CleanupOutcome::default();

    for id in store.list_ids().await? {
        let Some(stored) = store.get(&id).await? else {
            continue;
        };
        if stored.record.pending_deletion.is_empty() {
            continue;
        }

        let mut deleted = BTreeSet::new();
        for hostname in &stored.record.pending_deletion {
            match registry.delete_bot(hostname).await {
                Ok(()) => {
                    debug!(machine_type = %id, hostname = %hostname, "bot registration deleted");
                    deleted.insert(hostname.clone());
                }
                Err(err) => {
                    warn!(
                        machine_type = %id,
                        hostname = %hostname,
                        error = %err,
                        "failed to delete bot registration, will retry next pass"
                    );
                    outcome.failed += 1;
                }
            }
        }

        outcome.deleted += deleted.len();
        clear_pending_deletion(store, config, &id, &deleted).await?;
    }

    if outcome.deleted > 0 || outcome.failed > 0 {
        info!(
            deleted = outcome.deleted,
            failed = outcome.failed,
            "bot cleanup pass finished"
        );
    }
    Ok(outcome)
}

/// Subtract confirmed-deleted hostnames from one stored deletion queue.
///
/// Re-reads the record inside the transaction so hostnames added by a
/// concurrent expiry pass survive. A machine type that no longer exists
/// is a silent no-op: missing configuration means it was retired, and
/// recreating it here would resurrect state the loader already dropped.
pub async fn clear_pending_deletion(
    store: &dyn MachineTypeStore,
    config: &LeaseManagerConfig,
    id: &MachineTypeId,
    deleted: &BTreeSet<String>,
) -> Result<()> {
    if deleted.is_empty() {
        return Ok(());
    }

    read_modify_write(
        store,
        id,
        config.max_txn_attempts,
        config.txn_retry_backoff,
        |record| {
            let remaining: BTreeSet<String> = record
                .pending_deletion
                .difference(deleted)
                .cloned()
                .collect();
            if remaining.len() == record.pending_deletion.len() {
                return Mutation::Skip(());
            }
            record.pending_deletion = remaining;
            Mutation::Write(())
        },
    )
    .await?;

    Ok(())
}

/// Mock registration store for testing.
pub struct MockBotRegistry {
    registered: DashSet<String>,
    failing: DashSet<String>,
}

impl MockBotRegistry {
    /// Create a mock with no registrations.
    pub fn new() -> Self {
        Self {
            registered: DashSet::new(),
            failing: DashSet::new(),
        }
    }

    /// Register a bot hostname.
    pub fn register(&self, hostname: impl Into<String>) {
        self.registered.insert(hostname.into());
    }

    /// Make deletes for `hostname` fail.
    pub fn fail_on(&self, hostname: impl Into<String>) {
        self.failing.insert(hostname.into());
    }

    /// Whether a registration still exists.
    pub fn is_registered(&self, hostname: &str) -> bool {
        self.registered.contains(hostname)
    }
}

impl Default for MockBotRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BotRegistry for MockBotRegistry {
    async fn delete_bot(&self, hostname: &str) -> std::result::Result<(), RegistryError> {
        if self.failing.contains(hostname) {
            return Err(RegistryError::Backend("simulated failure".to_string()));
        }
        self.registered.remove(hostname);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fleet_types::{Dimensions, MachineType, OsFamily};

    use super::*;
    use crate::storage::InMemoryMachineTypeStore;

    fn config() -> LeaseManagerConfig {
        LeaseManagerConfig::with_callback_url("https://example.com")
    }

    fn machine_type_with_queue(id: &str, hostnames: &[&str]) -> MachineType {
        let mut machine_type = MachineType::new(id, id, 2, Dimensions::os(OsFamily::Linux));
        machine_type.pending_deletion =
            hostnames.iter().map(|hostname| hostname.to_string()).collect();
        machine_type
    }

    fn registry_with(hostnames: &[&str]) -> Arc<dyn BotRegistry> {
        let registry = MockBotRegistry::new();
        for hostname in hostnames {
            registry.register(*hostname);
        }
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_no_machine_types() {
        let store = InMemoryMachineTypeStore::new();
        let registry = registry_with(&[]);
        let outcome = clean_up_bots(&store, &registry, &config()).await.unwrap();
        assert_eq!(outcome, CleanupOutcome::default());
    }

    #[tokio::test]
    async fn test_none_pending_deletion() {
        let store = InMemoryMachineTypeStore::new();
        store.seed(machine_type_with_queue("none-pending-deletion", &[]));
        let registry = registry_with(&["fake-host-1"]);

        let outcome = clean_up_bots(&store, &registry, &config()).await.unwrap();

        assert_eq!(outcome, CleanupOutcome::default());
        let stored = store
            .get(&MachineTypeId::from("none-pending-deletion"))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.record.pending_deletion.is_empty());
    }

    #[tokio::test]
    async fn test_pending_deletion_fully_drained() {
        let hostnames: Vec<String> = (0..200).map(|i| format!("fake-bot-{i}")).collect();
        let hostname_refs: Vec<&str> =
            hostnames.iter().map(|hostname| hostname.as_str()).collect();

        let store = InMemoryMachineTypeStore::new();
        store.seed(machine_type_with_queue("few-pending-deletion", &hostname_refs));
        let registry = MockBotRegistry::new();
        for hostname in &hostnames {
            registry.register(hostname.clone());
        }
        let registry: Arc<dyn BotRegistry> = Arc::new(registry);

        let outcome = clean_up_bots(&store, &registry, &config()).await.unwrap();

        assert_eq!(outcome.deleted, 200);
        assert_eq!(outcome.failed, 0);
        let stored = store
            .get(&MachineTypeId::from("few-pending-deletion"))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.record.pending_deletion.is_empty());
    }

    #[tokio::test]
    async fn test_partial_confirmation_keeps_unconfirmed_hostname() {
        let store = InMemoryMachineTypeStore::new();
        store.seed(machine_type_with_queue(
            "partial",
            &["fake-host-2", "fake-host-3"],
        ));
        let registry = MockBotRegistry::new();
        registry.register("fake-host-2");
        registry.register("fake-host-3");
        registry.fail_on("fake-host-3");
        let registry: Arc<dyn BotRegistry> = Arc::new(registry);

        let outcome = clean_up_bots(&store, &registry, &config()).await.unwrap();

        assert_eq!(outcome.deleted, 1);
        assert_eq!(outcome.failed, 1);
        let stored = store
            .get(&MachineTypeId::from("partial"))
            .await
            .unwrap()
            .unwrap();
        let remaining: Vec<_> = stored.record.pending_deletion.iter().cloned().collect();
        assert_eq!(remaining, vec!["fake-host-3".to_string()]);
    }

    #[tokio::test]
    async fn test_unregistered_hostname_still_cleared() {
        // Deleting an absent registration is success, so the queue drains.
        let store = InMemoryMachineTypeStore::new();
        store.seed(machine_type_with_queue("ghost", &["never-registered"]));
        let registry = registry_with(&[]);

        let outcome = clean_up_bots(&store, &registry, &config()).await.unwrap();

        assert_eq!(outcome.deleted, 1);
        let stored = store.get(&MachineTypeId::from("ghost")).await.unwrap().unwrap();
        assert!(stored.record.pending_deletion.is_empty());
    }

    #[tokio::test]
    async fn test_clear_pending_deletion_missing_entity_is_noop() {
        let store = InMemoryMachineTypeStore::new();
        let deleted: BTreeSet<String> =
            ["fake-bot-1", "fake-bot-2"].iter().map(|s| s.to_string()).collect();

        clear_pending_deletion(&store, &config(), &MachineTypeId::from("not-found"), &deleted)
            .await
            .unwrap();

        assert!(store
            .get(&MachineTypeId::from("not-found"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_clear_pending_deletion_subtracts_only_confirmed() {
        let store = InMemoryMachineTypeStore::new();
        store.seed(machine_type_with_queue(
            "pending-deletion",
            &["fake-bot-1", "fake-bot-2"],
        ));
        let deleted: BTreeSet<String> = ["fake-bot-1".to_string()].into_iter().collect();

        clear_pending_deletion(
            &store,
            &config(),
            &MachineTypeId::from("pending-deletion"),
            &deleted,
        )
        .await
        .unwrap();

        let stored = store
            .get(&MachineTypeId::from("pending-deletion"))
            .await
            .unwrap()
            .unwrap();
        let remaining: Vec<_> = stored.record.pending_deletion.iter().cloned().collect();
        assert_eq!(remaining, vec!["fake-bot-2".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_preserves_concurrently_queued_hostnames() {
        // A hostname queued after the cleanup pass read its snapshot must
        // survive the subtraction.
        let store = InMemoryMachineTypeStore::new();
        store.seed(machine_type_with_queue("concurrent", &["fake-host-1"]));
        let id = MachineTypeId::from("concurrent");

        // Concurrent expiry pass queues another host.
        let stored = store.get(&id).await.unwrap().unwrap();
        let mut record = stored.record.clone();
        record.pending_deletion.insert("fake-host-9".to_string());
        store.put(&record, Some(stored.revision)).await.unwrap();

        let deleted: BTreeSet<String> = ["fake-host-1".to_string()].into_iter().collect();
        clear_pending_deletion(&store, &config(), &id, &deleted).await.unwrap();

        let stored = store.get(&id).await.unwrap().unwrap();
        let remaining: Vec<_> = stored.record.pending_deletion.iter().cloned().collect();
        assert_eq!(remaining, vec!["fake-host-9".to_string()]);
    }
}
