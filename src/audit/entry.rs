//! Audit entry data structures
//!
//! Defines the events recorded during migration and verification runs. The
//! audit trail is what lets an operator distinguish "legitimately empty" from
//! "decryption failed" after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{RecordId, UserId};

/// Events emitted by the migration and verification engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    /// A migration run started
    MigrationStarted,
    /// A record's encrypted pair was written
    RecordEncrypted,
    /// A record was already encrypted and left untouched
    RecordSkipped,
    /// A record could not be migrated (encryption, round-trip, or store error)
    RecordFailed,
    /// A migration run finished
    MigrationCompleted,
    /// A sampled record passed verification
    RecordVerified,
    /// A sampled record failed verification
    VerificationFailed,
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditEvent::MigrationStarted => write!(f, "MIGRATION_STARTED"),
            AuditEvent::RecordEncrypted => write!(f, "RECORD_ENCRYPTED"),
            AuditEvent::RecordSkipped => write!(f, "RECORD_SKIPPED"),
            AuditEvent::RecordFailed => write!(f, "RECORD_FAILED"),
            AuditEvent::MigrationCompleted => write!(f, "MIGRATION_COMPLETED"),
            AuditEvent::RecordVerified => write!(f, "RECORD_VERIFIED"),
            AuditEvent::VerificationFailed => write!(f, "VERIFICATION_FAILED"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the event happened
    pub timestamp: DateTime<Utc>,

    /// The user whose run produced the event
    pub user_id: UserId,

    /// The record involved, if the event is record-scoped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,

    /// The event kind
    pub event: AuditEvent,

    /// Human-readable context
    #[serde(default)]
    pub detail: String,
}

impl AuditEntry {
    /// Create a run-scoped entry
    pub fn for_run(user_id: UserId, event: AuditEvent, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id,
            record_id: None,
            event,
            detail: detail.into(),
        }
    }

    /// Create a record-scoped entry
    pub fn for_record(
        user_id: UserId,
        record_id: RecordId,
        event: AuditEvent,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id,
            record_id: Some(record_id),
            event,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serialization() {
        let entry = AuditEntry::for_run(UserId::new(), AuditEvent::MigrationStarted, "3 records");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("migration_started"));
        // Record-less entries omit the field entirely
        assert!(!json.contains("record_id"));

        let parsed: AuditEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event, AuditEvent::MigrationStarted);
        assert_eq!(parsed.detail, "3 records");
    }

    #[test]
    fn test_event_display() {
        assert_eq!(AuditEvent::RecordEncrypted.to_string(), "RECORD_ENCRYPTED");
    }
}
