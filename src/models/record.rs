//! Ledger record model
//!
//! Represents one financial transaction row with both its legacy plaintext
//! fields and the encrypted pair written by the migration. The encrypted pair
//! is always written as a unit together with the `is_encrypted` flag.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedField;

use super::ids::{CategoryId, RecordId, UserId};
use super::money::Money;

/// A financial transaction record owned by exactly one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier
    pub id: RecordId,

    /// The user this record belongs to
    pub user_id: UserId,

    /// Transaction date
    pub date: NaiveDate,

    /// Category reference (optional)
    pub category_id: Option<CategoryId>,

    /// Legacy plaintext amount, retained during the transition period
    pub amount: Money,

    /// Legacy plaintext description
    #[serde(default)]
    pub description: String,

    /// Encrypted amount (empty sentinel when not yet migrated)
    #[serde(default)]
    pub amount_encrypted: EncryptedField,

    /// Encrypted description (empty sentinel when not yet migrated)
    #[serde(default)]
    pub description_encrypted: EncryptedField,

    /// Whether the encrypted pair has been populated
    #[serde(default)]
    pub is_encrypted: bool,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// When the record was last modified
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Create a new unencrypted (legacy) record
    pub fn new(user_id: UserId, date: NaiveDate, amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::new(),
            user_id,
            date,
            category_id: None,
            amount,
            description: String::new(),
            amount_encrypted: EncryptedField::empty(),
            description_encrypted: EncryptedField::empty(),
            is_encrypted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a record with all common fields
    pub fn with_details(
        user_id: UserId,
        date: NaiveDate,
        amount: Money,
        description: impl Into<String>,
        category_id: Option<CategoryId>,
    ) -> Self {
        let mut record = Self::new(user_id, date, amount);
        record.description = description.into();
        record.category_id = category_id;
        record
    }

    /// Check whether the encrypted pair is actually populated
    ///
    /// The flag alone is not trusted: a record counts as encrypted only when
    /// the amount ciphertext is present as well. The description ciphertext may
    /// legitimately be the empty sentinel (empty description).
    pub fn is_fully_encrypted(&self) -> bool {
        self.is_encrypted && !self.amount_encrypted.is_empty()
    }
}
