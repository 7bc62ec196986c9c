//! Transactional read-modify-write wrapper.
//!
//! Every ledger mutation in this crate goes through [`read_modify_write`]:
//! load a fresh copy, apply the mutation in memory, write back under
//! compare-and-swap. A revision conflict means a concurrent pass won the
//! write; the whole cycle is re-run against the new copy, with bounded
//! attempts and backoff so contention never blocks a scheduler slot
//! indefinitely.

use std::time::Duration;

use fleet_types::{MachineType, MachineTypeId};
use tracing::debug;

use super::traits::{MachineTypeStore, StoreError, Versioned};
use crate::error::{LeaseError, Result};

/// What a transaction closure decided for the copy it was handed.
pub enum Mutation<R> {
    /// Persist the mutated record, then yield the value.
    Write(R),

    /// Leave the stored record untouched and yield the value.
    Skip(R),
}

/// Atomically mutate one stored machine type.
///
/// The closure runs against a fresh copy on every attempt, so it must be
/// safe to re-run; all mutation logic in this crate is. Returns `Ok(None)`
/// when no record exists under `id` — absent configuration is
/// already-drained state, not an error.
pub async fn read_modify_write<R, F>(
    store: &dyn MachineTypeStore,
    id: &MachineTypeId,
    max_attempts: u32,
    backoff: Duration,
    mut op: F,
) -> Result<Option<R>>
where
    F: FnMut(&mut MachineType) -> Mutation<R> + Send,
    R: Send,
{
    let mut delay = backoff;
    for attempt in 1..=max_attempts {
        let Some(Versioned { revision, mut record }) = store.get(id).await? else {
            return Ok(None);
        };

        match op(&mut record) {
            Mutation::Skip(value) => return Ok(Some(value)),
            Mutation::Write(value) => match store.put(&record, Some(revision)).await {
                Ok(_) => return Ok(Some(value)),
                Err(StoreError::RevisionConflict(_)) => {
                    debug!(
                        machine_type = %id,
                        attempt,
                        "revision conflict, retrying transaction"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(err) => return Err(err.into()),
            },
        }
    }

    Err(LeaseError::TransactionContention {
        machine_type: id.clone(),
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use fleet_types::{Dimensions, OsFamily};

    use super::*;
    use crate::storage::memory::InMemoryMachineTypeStore;

    /// Store wrapper that fails the first `conflicts` writes, as if a
    /// concurrent pass kept winning the race.
    struct ContentiousStore {
        inner: InMemoryMachineTypeStore,
        conflicts: AtomicU32,
    }

    impl ContentiousStore {
        fn new(inner: InMemoryMachineTypeStore, conflicts: u32) -> Self {
            Self {
                inner,
                conflicts: AtomicU32::new(conflicts),
            }
        }
    }

    #[async_trait]
    impl MachineTypeStore for ContentiousStore {
        async fn get(
            &self,
            id: &MachineTypeId,
        ) -> std::result::Result<Option<Versioned<MachineType>>, StoreError> {
            self.inner.get(id).await
        }

        async fn put(
            &self,
            record: &MachineType,
            expected: Option<u64>,
        ) -> std::result::Result<u64, StoreError> {
            if self.conflicts.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            }).is_ok()
            {
                return Err(StoreError::RevisionConflict(record.id.clone()));
            }
            self.inner.put(record, expected).await
        }

        async fn list_ids(&self) -> std::result::Result<Vec<MachineTypeId>, StoreError> {
            self.inner.list_ids().await
        }
    }

    fn seeded(id: &str) -> InMemoryMachineTypeStore {
        let store = InMemoryMachineTypeStore::new();
        store.seed(MachineType::new(id, id, 1, Dimensions::os(OsFamily::Linux)));
        store
    }

    #[tokio::test]
    async fn test_missing_record_short_circuits() {
        let store = InMemoryMachineTypeStore::new();
        let result = read_modify_write(
            &store,
            &MachineTypeId::from("absent"),
            3,
            Duration::from_millis(1),
            |_| Mutation::Write(()),
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_skip_does_not_write() {
        let store = seeded("skip");
        let id = MachineTypeId::from("skip");

        let result = read_modify_write(&store, &id, 3, Duration::from_millis(1), |record| {
            record.target_size = 99;
            Mutation::Skip("unchanged")
        })
        .await
        .unwrap();

        assert_eq!(result, Some("unchanged"));
        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.record.target_size, 1);
        assert_eq!(loaded.revision, 1);
    }

    #[tokio::test]
    async fn test_retries_through_conflicts() {
        let store = ContentiousStore::new(seeded("contended"), 2);
        let id = MachineTypeId::from("contended");
        let mut runs = 0;

        let result = read_modify_write(&store, &id, 5, Duration::from_millis(1), |record| {
            runs += 1;
            record.target_size = 7;
            Mutation::Write(())
        })
        .await
        .unwrap();

        assert!(result.is_some());
        // Two conflicted attempts plus the one that landed.
        assert_eq!(runs, 3);
        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.record.target_size, 7);
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_attempts() {
        let store = ContentiousStore::new(seeded("hot"), u32::MAX);
        let id = MachineTypeId::from("hot");

        let err = read_modify_write(&store, &id, 3, Duration::from_millis(1), |record| {
            record.target_size = 7;
            Mutation::Write(())
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            LeaseError::TransactionContention { attempts: 3, .. }
        ));
    }
}
