//! Bulk re-encryption of legacy plaintext records
//!
//! Drives one migration run per user: fetch the unencrypted rows, encrypt
//! both sensitive fields, prove the fresh ciphertext round-trips to the
//! original amount, then write the encrypted pair and the flag as a single
//! owner-scoped update. One bad record never stops the batch, and nothing is
//! ever deleted: plaintext columns are retained for the transition period.
//!
//! Re-running is safe. Only rows still missing the flag are fetched, so a run
//! abandoned between records (or a partial failure) resumes exactly where the
//! store says it left off.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audit::{AuditEntry, AuditEvent, AuditLogger};
use crate::crypto::FieldCipher;
use crate::error::LedgerResult;
use crate::models::{Money, Record, UserId};
use crate::store::{RecordFilter, RecordPatch, RecordStore};

/// Default delay between per-record writes, to avoid hammering the store
pub const DEFAULT_PACING: Duration = Duration::from_millis(50);

/// Lifecycle of a migration run
///
/// `Failed` is deliberately absent: failure is a per-record outcome counted in
/// [`MigrationProgress`], never a terminal state for the run itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Scanning,
    Processing,
    Completed,
}

/// Encryption-state counts for a user's records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStats {
    pub total: usize,
    pub encrypted: usize,
    pub remaining: usize,
}

/// Running counters for one migration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProgress {
    /// Records picked up by this run
    pub total: usize,
    /// Records whose encrypted pair was written
    pub processed: usize,
    /// Records found already encrypted and left untouched
    pub skipped: usize,
    /// Records that could not be migrated
    pub failed: usize,
}

impl MigrationProgress {
    /// Records accounted for so far (processed + skipped + failed)
    pub fn finished(&self) -> usize {
        self.processed + self.skipped + self.failed
    }

    /// Completion percentage, monotonically increasing over a run
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            100
        } else {
            ((self.finished() * 100) / self.total) as u8
        }
    }
}

/// Outcome of one migration run
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub progress: MigrationProgress,
    /// One human-readable line per record
    pub details: Vec<String>,
}

impl MigrationReport {
    /// True when no record failed
    pub fn is_clean(&self) -> bool {
        self.progress.failed == 0
    }
}

/// Tuning knobs for a migration run
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Delay between per-record writes; zero disables pacing
    pub pacing: Duration,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            pacing: DEFAULT_PACING,
        }
    }
}

/// Per-record result, internal to the run loop
enum RecordOutcome {
    Encrypted,
    Skipped,
    Failed(String),
}

/// Drives bulk re-encryption for one user at a time
pub struct MigrationService<'a> {
    store: &'a dyn RecordStore,
    cipher: &'a FieldCipher,
    audit: Option<&'a AuditLogger>,
    options: MigrationOptions,
    state: Mutex<RunState>,
}

impl<'a> MigrationService<'a> {
    /// Create a migration service over a store and cipher
    pub fn new(store: &'a dyn RecordStore, cipher: &'a FieldCipher) -> Self {
        Self {
            store,
            cipher,
            audit: None,
            options: MigrationOptions::default(),
            state: Mutex::new(RunState::Idle),
        }
    }

    /// Attach an audit logger recording per-record outcomes
    pub fn with_audit(mut self, audit: &'a AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Override the run options
    pub fn with_options(mut self, options: MigrationOptions) -> Self {
        self.options = options;
        self
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        self.state.lock().map(|guard| *guard).unwrap_or_default()
    }

    /// Count a user's records partitioned by encryption state
    ///
    /// Side-effect-free; safe to call at any time, including mid-run from
    /// another thread.
    pub fn scan(&self, user_id: UserId) -> LedgerResult<MigrationStats> {
        let total = self.store.count_records(user_id, RecordFilter::All)?;
        let encrypted = self.store.count_records(user_id, RecordFilter::Encrypted)?;

        Ok(MigrationStats {
            total,
            encrypted,
            remaining: total.saturating_sub(encrypted),
        })
    }

    /// Run a migration pass over the user's unencrypted records
    pub fn migrate(&self, user_id: UserId) -> LedgerResult<MigrationReport> {
        self.migrate_with_progress(user_id, |_| {})
    }

    /// Run a migration pass, observing progress after every record
    ///
    /// The callback sees counters that only ever grow, so a caller can render
    /// a completion percentage while the run is in flight.
    pub fn migrate_with_progress<F>(
        &self,
        user_id: UserId,
        mut on_progress: F,
    ) -> LedgerResult<MigrationReport>
    where
        F: FnMut(&MigrationProgress),
    {
        self.set_state(RunState::Scanning);
        let records = self
            .store
            .fetch_records(user_id, RecordFilter::Unencrypted)?;

        let mut progress = MigrationProgress {
            total: records.len(),
            ..MigrationProgress::default()
        };
        let mut details = Vec::with_capacity(records.len());

        tracing::info!(user = %user_id, total = records.len(), "starting migration run");
        self.audit_entry(AuditEntry::for_run(
            user_id,
            AuditEvent::MigrationStarted,
            format!("{} unencrypted records", records.len()),
        ));

        self.set_state(RunState::Processing);
        let total = records.len();
        for (index, record) in records.iter().enumerate() {
            match self.migrate_record(record) {
                RecordOutcome::Encrypted => {
                    progress.processed += 1;
                    tracing::debug!(record = %record.id, "record encrypted");
                    details.push(format!("{}: encrypted", record.id));
                    self.audit_entry(AuditEntry::for_record(
                        user_id,
                        record.id,
                        AuditEvent::RecordEncrypted,
                        "",
                    ));
                }
                RecordOutcome::Skipped => {
                    progress.skipped += 1;
                    details.push(format!("{}: skipped (already encrypted)", record.id));
                    self.audit_entry(AuditEntry::for_record(
                        user_id,
                        record.id,
                        AuditEvent::RecordSkipped,
                        "",
                    ));
                }
                RecordOutcome::Failed(reason) => {
                    progress.failed += 1;
                    tracing::warn!(record = %record.id, reason = %reason, "record migration failed");
                    details.push(format!("{}: failed: {}", record.id, reason));
                    self.audit_entry(AuditEntry::for_record(
                        user_id,
                        record.id,
                        AuditEvent::RecordFailed,
                        reason,
                    ));
                }
            }

            on_progress(&progress);

            if !self.options.pacing.is_zero() && index + 1 < total {
                std::thread::sleep(self.options.pacing);
            }
        }

        self.set_state(RunState::Completed);
        tracing::info!(
            user = %user_id,
            processed = progress.processed,
            skipped = progress.skipped,
            failed = progress.failed,
            "migration run complete"
        );
        self.audit_entry(AuditEntry::for_run(
            user_id,
            AuditEvent::MigrationCompleted,
            format!(
                "{} encrypted, {} skipped, {} failed",
                progress.processed, progress.skipped, progress.failed
            ),
        ));

        Ok(MigrationReport { progress, details })
    }

    /// Process a single record; every failure is contained here
    fn migrate_record(&self, record: &Record) -> RecordOutcome {
        // Re-check against a concurrent migration having gotten here first
        if record.is_fully_encrypted() {
            return RecordOutcome::Skipped;
        }

        let amount_plain = record.amount.to_plain_string();
        let amount_encrypted = match self.cipher.encrypt_field(&amount_plain, record.user_id) {
            Ok(field) => field,
            Err(e) => return RecordOutcome::Failed(format!("amount encryption: {}", e)),
        };
        let description_encrypted = match self
            .cipher
            .encrypt_field(&record.description, record.user_id)
        {
            Ok(field) => field,
            Err(e) => return RecordOutcome::Failed(format!("description encryption: {}", e)),
        };

        // Write-time integrity check: the fresh ciphertext must decrypt back
        // to the exact original amount before anything touches the store
        match self
            .cipher
            .try_decrypt_field(&amount_encrypted, record.user_id)
        {
            Ok(round_trip) => match Money::parse(&round_trip) {
                Ok(parsed) if parsed == record.amount => {}
                _ => {
                    return RecordOutcome::Failed(format!(
                        "round-trip amount mismatch (expected {})",
                        record.amount
                    ))
                }
            },
            Err(e) => return RecordOutcome::Failed(format!("round-trip decryption: {}", e)),
        }

        let patch = RecordPatch::encrypted_pair(amount_encrypted, description_encrypted);
        match self.store.update_record(record.id, record.user_id, &patch) {
            Ok(()) => RecordOutcome::Encrypted,
            Err(e) => RecordOutcome::Failed(format!("store update: {}", e)),
        }
    }

    fn set_state(&self, state: RunState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    fn audit_entry(&self, entry: AuditEntry) {
        if let Some(logger) = self.audit {
            if let Err(e) = logger.log(&entry) {
                tracing::warn!(error = %e, "failed to write audit entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptionConfig;
    use crate::crypto::KdfParams;
    use crate::error::LedgerError;
    use crate::models::{Record, RecordId};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::sync::RwLock;

    fn test_cipher() -> FieldCipher {
        let config = EncryptionConfig::new(
            "an-example-master-secret-at-least-32-chars",
            KdfParams::with_values(8192, 1, 1),
        )
        .unwrap();
        FieldCipher::new(config)
    }

    fn no_pacing() -> MigrationOptions {
        MigrationOptions {
            pacing: Duration::ZERO,
        }
    }

    fn seed_records(store: &MemoryStore, user: UserId, cents: &[i64]) -> Vec<RecordId> {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        cents
            .iter()
            .map(|&c| {
                let record =
                    Record::with_details(user, date, Money::from_cents(c), "Groceries", None);
                let id = record.id;
                store.insert(record).unwrap();
                id
            })
            .collect()
    }

    #[test]
    fn test_scan_counts() {
        let store = MemoryStore::new();
        let cipher = test_cipher();
        let user = UserId::new();
        seed_records(&store, user, &[100, 200, 300]);

        let service = MigrationService::new(&store, &cipher).with_options(no_pacing());
        let stats = service.scan(user).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.encrypted, 0);
        assert_eq!(stats.remaining, 3);
    }

    #[test]
    fn test_migrate_encrypts_everything() {
        let store = MemoryStore::new();
        let cipher = test_cipher();
        let user = UserId::new();
        let ids = seed_records(&store, user, &[10000, 20050, -5000]);

        let service = MigrationService::new(&store, &cipher).with_options(no_pacing());
        let report = service.migrate(user).unwrap();

        assert_eq!(report.progress.processed, 3);
        assert_eq!(report.progress.failed, 0);
        assert!(report.is_clean());
        assert_eq!(service.state(), RunState::Completed);

        for id in ids {
            let record = store.get(id).unwrap().unwrap();
            assert!(record.is_fully_encrypted());
            // Plaintext columns are never cleared
            assert_eq!(record.description, "Groceries");
            // Ciphertext decrypts back to the original amount
            let decrypted = cipher
                .try_decrypt_field(&record.amount_encrypted, user)
                .unwrap();
            assert_eq!(Money::parse(&decrypted).unwrap(), record.amount);
        }

        let stats = service.scan(user).unwrap();
        assert_eq!(stats.remaining, 0);
        assert_eq!(stats.encrypted, 3);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let store = MemoryStore::new();
        let cipher = test_cipher();
        let user = UserId::new();
        seed_records(&store, user, &[100, 200]);

        let service = MigrationService::new(&store, &cipher).with_options(no_pacing());
        let first = service.migrate(user).unwrap();
        assert_eq!(first.progress.processed, 2);

        // Second run picks up nothing
        let second = service.migrate(user).unwrap();
        assert_eq!(second.progress.total, 0);
        assert_eq!(second.progress.finished(), 0);
        assert_eq!(service.scan(user).unwrap().remaining, 0);
    }

    #[test]
    fn test_tenant_isolation() {
        let store = MemoryStore::new();
        let cipher = test_cipher();
        let user1 = UserId::new();
        let user2 = UserId::new();
        seed_records(&store, user1, &[100]);
        let other_ids = seed_records(&store, user2, &[200, 300]);

        let service = MigrationService::new(&store, &cipher).with_options(no_pacing());
        service.migrate(user1).unwrap();

        for id in other_ids {
            assert!(!store.get(id).unwrap().unwrap().is_encrypted);
        }
    }

    #[test]
    fn test_progress_is_monotonic() {
        let store = MemoryStore::new();
        let cipher = test_cipher();
        let user = UserId::new();
        seed_records(&store, user, &[100, 200, 300, 400]);

        let service = MigrationService::new(&store, &cipher).with_options(no_pacing());
        let mut seen = Vec::new();
        service
            .migrate_with_progress(user, |p| seen.push(*p))
            .unwrap();

        assert_eq!(seen.len(), 4);
        for (i, progress) in seen.iter().enumerate() {
            assert_eq!(progress.finished(), i + 1);
        }
        assert_eq!(seen.last().unwrap().percent(), 100);
    }

    #[test]
    fn test_empty_run_completes_immediately() {
        let store = MemoryStore::new();
        let cipher = test_cipher();

        let service = MigrationService::new(&store, &cipher).with_options(no_pacing());
        let report = service.migrate(UserId::new()).unwrap();
        assert_eq!(report.progress.total, 0);
        assert_eq!(service.state(), RunState::Completed);
    }

    /// Store wrapper that fails updates for chosen records
    struct FlakyStore {
        inner: MemoryStore,
        fail_ids: RwLock<HashSet<RecordId>>,
    }

    impl FlakyStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                fail_ids: RwLock::new(HashSet::new()),
            }
        }

        fn fail_on(&self, id: RecordId) {
            self.fail_ids.write().unwrap().insert(id);
        }

        fn clear_failures(&self) {
            self.fail_ids.write().unwrap().clear();
        }
    }

    impl RecordStore for FlakyStore {
        fn count_records(&self, user_id: UserId, filter: RecordFilter) -> LedgerResult<usize> {
            self.inner.count_records(user_id, filter)
        }

        fn fetch_records(
            &self,
            user_id: UserId,
            filter: RecordFilter,
        ) -> LedgerResult<Vec<Record>> {
            self.inner.fetch_records(user_id, filter)
        }

        fn update_record(
            &self,
            id: RecordId,
            user_id: UserId,
            patch: &RecordPatch,
        ) -> LedgerResult<()> {
            if self.fail_ids.read().unwrap().contains(&id) {
                return Err(LedgerError::Storage("injected write failure".to_string()));
            }
            self.inner.update_record(id, user_id, patch)
        }

        fn fetch_backup(&self, ids: &[RecordId]) -> LedgerResult<Vec<Record>> {
            self.inner.fetch_backup(ids)
        }
    }

    #[test]
    fn test_one_failure_does_not_abort_the_run() {
        let store = FlakyStore::new(MemoryStore::new());
        let cipher = test_cipher();
        let user = UserId::new();
        let ids = seed_records(&store.inner, user, &[100, 200, 300]);
        store.fail_on(ids[1]);

        let service = MigrationService::new(&store, &cipher).with_options(no_pacing());
        let report = service.migrate(user).unwrap();

        assert_eq!(report.progress.processed, 2);
        assert_eq!(report.progress.failed, 1);
        assert_eq!(report.progress.finished(), 3);
        assert!(report
            .details
            .iter()
            .any(|d| d.starts_with(&ids[1].to_string()) && d.contains("failed")));

        // Retry only touches the record that failed
        store.clear_failures();
        let retry = service.migrate(user).unwrap();
        assert_eq!(retry.progress.total, 1);
        assert_eq!(retry.progress.processed, 1);
        assert!(store.inner.get(ids[1]).unwrap().unwrap().is_fully_encrypted());
    }

    /// Store whose fetch returns a row another migration already encrypted,
    /// as can happen between the fetch and the per-record processing
    struct StaleFetchStore {
        inner: MemoryStore,
        updates: RwLock<usize>,
    }

    impl RecordStore for StaleFetchStore {
        fn count_records(&self, user_id: UserId, filter: RecordFilter) -> LedgerResult<usize> {
            self.inner.count_records(user_id, filter)
        }

        fn fetch_records(&self, user_id: UserId, _: RecordFilter) -> LedgerResult<Vec<Record>> {
            // Stale view: returns every row regardless of filter
            self.inner.fetch_records(user_id, RecordFilter::All)
        }

        fn update_record(
            &self,
            id: RecordId,
            user_id: UserId,
            patch: &RecordPatch,
        ) -> LedgerResult<()> {
            *self.updates.write().unwrap() += 1;
            self.inner.update_record(id, user_id, patch)
        }

        fn fetch_backup(&self, ids: &[RecordId]) -> LedgerResult<Vec<Record>> {
            self.inner.fetch_backup(ids)
        }
    }

    #[test]
    fn test_defensive_recheck_skips_encrypted_rows() {
        let store = StaleFetchStore {
            inner: MemoryStore::new(),
            updates: RwLock::new(0),
        };
        let cipher = test_cipher();
        let user = UserId::new();
        let ids = seed_records(&store.inner, user, &[100, 200]);

        // Encrypt the first row out-of-band, as a concurrent run would
        let encrypted = cipher.encrypt_field("1.00", user).unwrap();
        let desc = cipher.encrypt_field("Groceries", user).unwrap();
        store
            .inner
            .update_record(ids[0], user, &RecordPatch::encrypted_pair(encrypted, desc))
            .unwrap();
        *store.updates.write().unwrap() = 0;

        let service = MigrationService::new(&store, &cipher).with_options(no_pacing());
        let report = service.migrate(user).unwrap();

        assert_eq!(report.progress.skipped, 1);
        assert_eq!(report.progress.processed, 1);
        // Only the unencrypted row was written
        assert_eq!(*store.updates.read().unwrap(), 1);
    }

    #[test]
    fn test_audit_trail_records_outcomes() {
        use crate::audit::{AuditEvent, AuditLogger};
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let logger = AuditLogger::new(temp_dir.path().join("audit.log"));
        let store = MemoryStore::new();
        let cipher = test_cipher();
        let user = UserId::new();
        seed_records(&store, user, &[100]);

        let service = MigrationService::new(&store, &cipher)
            .with_options(no_pacing())
            .with_audit(&logger);
        service.migrate(user).unwrap();

        let events: Vec<_> = logger
            .read_all()
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert_eq!(
            events,
            vec![
                AuditEvent::MigrationStarted,
                AuditEvent::RecordEncrypted,
                AuditEvent::MigrationCompleted,
            ]
        );
    }
}
