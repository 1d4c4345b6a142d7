//! In-memory record store
//!
//! Reference implementation of the store contract, used by tests and by
//! embedders that manage persistence themselves. Rows keep insertion order,
//! so fetches are deterministic and not biased toward recent records.

use std::sync::RwLock;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Record, RecordId, UserId};

use super::{RecordFilter, RecordPatch, RecordStore};

/// In-memory record store with an optional backup snapshot
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<Record>>,
    backup: RwLock<Vec<Record>>,
}

fn lock_err<T>(_: T) -> LedgerError {
    LedgerError::Storage("Store lock poisoned".to_string())
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any existing row with the same id
    pub fn insert(&self, record: Record) -> LedgerResult<()> {
        let mut records = self.records.write().map_err(lock_err)?;
        if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
            *existing = record;
        } else {
            records.push(record);
        }
        Ok(())
    }

    /// Get a record by id
    pub fn get(&self, id: RecordId) -> LedgerResult<Option<Record>> {
        let records = self.records.read().map_err(lock_err)?;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    /// Capture the current rows into the backup snapshot
    ///
    /// The snapshot is append-only: rows already snapshotted are not
    /// overwritten, so the backup always reflects pre-migration values even if
    /// it is taken again later.
    pub fn snapshot_backup(&self) -> LedgerResult<()> {
        let records = self.records.read().map_err(lock_err)?;
        let mut backup = self.backup.write().map_err(lock_err)?;
        for record in records.iter() {
            if !backup.iter().any(|b| b.id == record.id) {
                backup.push(record.clone());
            }
        }
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn count_records(&self, user_id: UserId, filter: RecordFilter) -> LedgerResult<usize> {
        let records = self.records.read().map_err(lock_err)?;
        Ok(records
            .iter()
            .filter(|r| r.user_id == user_id && filter.matches(r))
            .count())
    }

    fn fetch_records(&self, user_id: UserId, filter: RecordFilter) -> LedgerResult<Vec<Record>> {
        let records = self.records.read().map_err(lock_err)?;
        Ok(records
            .iter()
            .filter(|r| r.user_id == user_id && filter.matches(r))
            .cloned()
            .collect())
    }

    fn update_record(
        &self,
        id: RecordId,
        user_id: UserId,
        patch: &RecordPatch,
    ) -> LedgerResult<()> {
        let mut records = self.records.write().map_err(lock_err)?;
        let record = records
            .iter_mut()
            .find(|r| r.id == id && r.user_id == user_id)
            .ok_or_else(|| LedgerError::record_not_found(id.to_string()))?;
        patch.apply_to(record);
        Ok(())
    }

    fn fetch_backup(&self, ids: &[RecordId]) -> LedgerResult<Vec<Record>> {
        let backup = self.backup.read().map_err(lock_err)?;
        Ok(backup
            .iter()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect())
    }
}
