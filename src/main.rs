use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ledgerlock::audit::AuditLogger;
use ledgerlock::cli::{handle_migrate, handle_scan, handle_verify};
use ledgerlock::config::{EncryptionConfig, Paths};
use ledgerlock::crypto::FieldCipher;
use ledgerlock::models::UserId;
use ledgerlock::store::JsonStore;

#[derive(Parser)]
#[command(
    name = "ledgerlock",
    version,
    about = "At-rest encryption and migration tooling for personal-finance ledgers",
    long_about = "LedgerLock encrypts the sensitive fields of ledger records with \
                  per-user keys derived from a master secret, migrates legacy \
                  plaintext rows in place, and verifies the result against a \
                  pre-migration backup snapshot."
)]
struct Cli {
    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show encryption status for a user's records
    Scan {
        /// The user whose records to inspect
        #[arg(long)]
        user: UserId,
    },

    /// Encrypt all of a user's unencrypted records
    Migrate {
        /// The user whose records to migrate
        #[arg(long)]
        user: UserId,

        /// Delay between record writes in milliseconds
        #[arg(long, default_value_t = 50)]
        pace_ms: u64,
    },

    /// Verify encrypted records against the backup snapshot
    Verify {
        /// The user whose records to verify
        #[arg(long)]
        user: UserId,

        /// Maximum number of records to sample
        #[arg(long, default_value_t = 10)]
        sample_size: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // The configuration check happens exactly once, before any run starts
    let config = EncryptionConfig::from_env().context("encryption is not configured")?;

    let paths = match cli.data_dir {
        Some(dir) => Paths::with_base_dir(dir),
        None => Paths::new()?,
    };
    paths.ensure_directories()?;

    let store = JsonStore::open(paths.ledger_file())?;
    let cipher = FieldCipher::new(config);
    let audit = AuditLogger::new(paths.audit_log());

    match cli.command {
        Commands::Scan { user } => handle_scan(&store, &cipher, user)?,
        Commands::Migrate { user, pace_ms } => {
            handle_migrate(&store, &cipher, &audit, user, pace_ms)?
        }
        Commands::Verify { user, sample_size } => {
            handle_verify(&store, &cipher, &audit, user, sample_size)?
        }
    }

    Ok(())
}
