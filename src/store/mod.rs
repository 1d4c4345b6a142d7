//! Record store contract and implementations
//!
//! The migration and verification engines depend only on the [`RecordStore`]
//! trait: count, fetch, a partial owner-scoped update, and an optional backup
//! snapshot lookup. Two implementations are provided: [`MemoryStore`] for
//! tests and embedding, and [`JsonStore`] for the CLI.

pub mod file_io;
pub mod json;
pub mod memory;

pub use json::JsonStore;
pub use memory::MemoryStore;

use chrono::Utc;

use crate::crypto::EncryptedField;
use crate::error::LedgerResult;
use crate::models::{Record, RecordId, UserId};

/// Filter for record queries, partitioned by encryption state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFilter {
    /// All records for the user
    #[default]
    All,
    /// Records with `is_encrypted` set
    Encrypted,
    /// Records with `is_encrypted` false or unset
    Unencrypted,
}

impl RecordFilter {
    /// Check whether a record matches this filter
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::Encrypted => record.is_encrypted,
            Self::Unencrypted => !record.is_encrypted,
        }
    }
}

/// Partial update applied to one record
///
/// Only the fields that are `Some` are written; the store must apply them
/// all-or-nothing. The migration always patches the encrypted pair and the
/// flag together so a record is never left partially encrypted.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub amount_encrypted: Option<EncryptedField>,
    pub description_encrypted: Option<EncryptedField>,
    pub is_encrypted: Option<bool>,
}

impl RecordPatch {
    /// Patch that writes the encrypted pair and sets the flag, as one unit
    pub fn encrypted_pair(amount: EncryptedField, description: EncryptedField) -> Self {
        Self {
            amount_encrypted: Some(amount),
            description_encrypted: Some(description),
            is_encrypted: Some(true),
        }
    }

    /// Apply this patch to a record in place, bumping `updated_at`
    pub fn apply_to(&self, record: &mut Record) {
        if let Some(amount) = &self.amount_encrypted {
            record.amount_encrypted = amount.clone();
        }
        if let Some(description) = &self.description_encrypted {
            record.description_encrypted = description.clone();
        }
        if let Some(flag) = self.is_encrypted {
            record.is_encrypted = flag;
        }
        record.updated_at = Utc::now();
    }
}

/// Narrow persistence contract consumed by the engines
///
/// Implementations must scope `update_record` by both record id and owning
/// user id: an update for a record the user does not own fails with a
/// not-found error rather than touching another tenant's row. Stores without
/// a backup snapshot return an empty vec from `fetch_backup`, not an error.
pub trait RecordStore: Send + Sync {
    /// Count a user's records matching the filter
    fn count_records(&self, user_id: UserId, filter: RecordFilter) -> LedgerResult<usize>;

    /// Fetch a user's records matching the filter, in store order
    fn fetch_records(&self, user_id: UserId, filter: RecordFilter) -> LedgerResult<Vec<Record>>;

    /// Apply a partial update to one record, scoped by `(id, user_id)`
    fn update_record(
        &self,
        id: RecordId,
        user_id: UserId,
        patch: &RecordPatch,
    ) -> LedgerResult<()>;

    /// Fetch pre-migration backup rows for the given ids, if a snapshot exists
    fn fetch_backup(&self, ids: &[RecordId]) -> LedgerResult<Vec<Record>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Money;
    use chrono::NaiveDate;

    #[test]
    fn test_filter_matches() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut record = Record::new(UserId::new(), date, Money::from_cents(100));

        assert!(RecordFilter::All.matches(&record));
        assert!(RecordFilter::Unencrypted.matches(&record));
        assert!(!RecordFilter::Encrypted.matches(&record));

        record.is_encrypted = true;
        assert!(RecordFilter::Encrypted.matches(&record));
        assert!(!RecordFilter::Unencrypted.matches(&record));
    }

    #[test]
    fn test_patch_applies_pair_as_unit() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut record = Record::new(UserId::new(), date, Money::from_cents(100));
        let before = record.updated_at;

        let patch = RecordPatch::encrypted_pair(
            EncryptedField::from("v1:AAAA:BBBB"),
            EncryptedField::from("v1:CCCC:DDDD"),
        );
        patch.apply_to(&mut record);

        assert!(record.is_encrypted);
        assert_eq!(record.amount_encrypted.as_str(), "v1:AAAA:BBBB");
        assert_eq!(record.description_encrypted.as_str(), "v1:CCCC:DDDD");
        assert!(record.updated_at >= before);
    }

    #[test]
    fn test_empty_patch_changes_nothing_but_timestamp() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut record = Record::new(UserId::new(), date, Money::from_cents(100));

        RecordPatch::default().apply_to(&mut record);

        assert!(!record.is_encrypted);
        assert!(record.amount_encrypted.is_empty());
    }
}
