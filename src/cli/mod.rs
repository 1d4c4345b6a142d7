//! CLI command handlers
//!
//! Bridges the clap argument parsing in `main.rs` with the service layer.
//! This is the "UI layer" collaborator of the engines: it supplies the user
//! identity, triggers runs, and renders their reports.

use std::time::Duration;

use crate::audit::AuditLogger;
use crate::crypto::FieldCipher;
use crate::error::LedgerResult;
use crate::models::UserId;
use crate::services::{MigrationOptions, MigrationService, VerificationService};
use crate::store::RecordStore;

/// Show the encryption status of a user's records
pub fn handle_scan(
    store: &dyn RecordStore,
    cipher: &FieldCipher,
    user: UserId,
) -> LedgerResult<()> {
    let service = MigrationService::new(store, cipher);
    let stats = service.scan(user)?;

    println!("Migration status for {}", user);
    println!("  Total records: {}", stats.total);
    println!("  Encrypted:     {}", stats.encrypted);
    println!("  Remaining:     {}", stats.remaining);

    if stats.total > 0 && stats.remaining == 0 {
        println!();
        println!("All records are encrypted.");
    } else if stats.remaining > 0 {
        println!();
        println!(
            "{} records still need encryption. Run 'ledgerlock migrate' to encrypt them.",
            stats.remaining
        );
    }

    Ok(())
}

/// Encrypt all of a user's unencrypted records
pub fn handle_migrate(
    store: &dyn RecordStore,
    cipher: &FieldCipher,
    audit: &AuditLogger,
    user: UserId,
    pace_ms: u64,
) -> LedgerResult<()> {
    let service = MigrationService::new(store, cipher)
        .with_audit(audit)
        .with_options(MigrationOptions {
            pacing: Duration::from_millis(pace_ms),
        });

    let stats = service.scan(user)?;
    if stats.remaining == 0 {
        println!("Nothing to migrate: all {} records are encrypted.", stats.total);
        return Ok(());
    }

    println!("Encrypting {} records...", stats.remaining);
    let report = service.migrate_with_progress(user, |progress| {
        println!(
            "  [{:>3}%] {}/{}",
            progress.percent(),
            progress.finished(),
            progress.total
        );
    })?;

    println!();
    println!(
        "Migration complete: {} encrypted, {} skipped, {} failed.",
        report.progress.processed, report.progress.skipped, report.progress.failed
    );

    if !report.is_clean() {
        println!();
        println!("Failed records:");
        for detail in report.details.iter().filter(|d| d.contains("failed")) {
            println!("  {}", detail);
        }
        println!("Re-run 'ledgerlock migrate' to retry them.");
    }

    Ok(())
}

/// Verify encrypted records against the backup snapshot
pub fn handle_verify(
    store: &dyn RecordStore,
    cipher: &FieldCipher,
    audit: &AuditLogger,
    user: UserId,
    sample_size: usize,
) -> LedgerResult<()> {
    let service = VerificationService::new(store, cipher).with_audit(audit);
    let report = service.verify_sample(user, sample_size)?;

    if report.success {
        println!("Verification passed.");
    } else {
        println!("Verification found issues.");
    }
    println!("  Tested: {}", report.tested);
    println!("  Passed: {}", report.passed);
    println!("  Failed: {}", report.failed);

    println!();
    for detail in &report.details {
        println!("  {}", detail);
    }

    Ok(())
}
