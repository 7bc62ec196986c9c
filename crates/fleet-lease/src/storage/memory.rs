//! In-memory storage backend.
//!
//! `DashMap`-backed reference implementation with real compare-and-swap
//! semantics: concurrent writers racing on the same machine type observe
//! revision conflicts exactly as they would against a remote store.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fleet_types::{MachineType, MachineTypeId};

use super::traits::{MachineTypeStore, StoreError, Versioned};

/// In-memory implementation for tests and local development.
pub struct InMemoryMachineTypeStore {
    records: DashMap<MachineTypeId, Versioned<MachineType>>,
}

impl InMemoryMachineTypeStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Insert a record unconditionally at revision 1.
    ///
    /// Stands in for the external configuration loader, which owns record
    /// creation in production.
    pub fn seed(&self, record: MachineType) {
        self.records.insert(
            record.id.clone(),
            Versioned {
                revision: 1,
                record,
            },
        );
    }
}

impl Default for InMemoryMachineTypeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MachineTypeStore for InMemoryMachineTypeStore {
    async fn get(&self, id: &MachineTypeId) -> Result<Option<Versioned<MachineType>>, StoreError> {
        Ok(self.records.get(id).map(|entry| entry.value().clone()))
    }

    async fn put(
        &self,
        record: &MachineType,
        expected: Option<u64>,
    ) -> Result<u64, StoreError> {
        // The entry guard holds the shard lock, making the
        // compare-and-swap atomic.
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(mut entry) => {
                let current = entry.get().revision;
                if expected != Some(current) {
                    return Err(StoreError::RevisionConflict(record.id.clone()));
                }
                let next = current + 1;
                entry.insert(Versioned {
                    revision: next,
                    record: record.clone(),
                });
                Ok(next)
            }
            Entry::Vacant(entry) => {
                if expected.is_some() {
                    return Err(StoreError::RevisionConflict(record.id.clone()));
                }
                entry.insert(Versioned {
                    revision: 1,
                    record: record.clone(),
                });
                Ok(1)
            }
        }
    }

    async fn list_ids(&self) -> Result<Vec<MachineTypeId>, StoreError> {
        Ok(self.records.iter().map(|entry| entry.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use fleet_types::{Dimensions, OsFamily};

    use super::*;

    fn linux_type(id: &str) -> MachineType {
        MachineType::new(id, id, 2, Dimensions::os(OsFamily::Linux))
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = InMemoryMachineTypeStore::new();
        let record = linux_type("create");

        let revision = store.put(&record, None).await.unwrap();
        assert_eq!(revision, 1);

        let loaded = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.record, record);
    }

    #[tokio::test]
    async fn test_create_conflicts_with_existing() {
        let store = InMemoryMachineTypeStore::new();
        let record = linux_type("dup");
        store.put(&record, None).await.unwrap();

        let err = store.put(&record, None).await.unwrap_err();
        assert!(matches!(err, StoreError::RevisionConflict(_)));
    }

    #[tokio::test]
    async fn test_stale_revision_conflicts() {
        let store = InMemoryMachineTypeStore::new();
        let mut record = linux_type("stale");
        store.put(&record, None).await.unwrap();

        record.target_size = 5;
        store.put(&record, Some(1)).await.unwrap();

        // A writer still holding revision 1 must lose.
        record.target_size = 9;
        let err = store.put(&record, Some(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::RevisionConflict(_)));

        let loaded = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.record.target_size, 5);
        assert_eq!(loaded.revision, 2);
    }

    #[tokio::test]
    async fn test_update_missing_record_conflicts() {
        let store = InMemoryMachineTypeStore::new();
        let record = linux_type("missing");
        let err = store.put(&record, Some(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::RevisionConflict(_)));
    }

    #[tokio::test]
    async fn test_list_ids() {
        let store = InMemoryMachineTypeStore::new();
        store.seed(linux_type("a"));
        store.seed(linux_type("b"));

        let mut ids = store.list_ids().await.unwrap();
        ids.sort();
        assert_eq!(
            ids,
            vec![MachineTypeId::from("a"), MachineTypeId::from("b")]
        );
    }
}
