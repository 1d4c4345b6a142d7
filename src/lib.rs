//! LedgerLock - at-rest encryption for personal-finance ledgers
//!
//! This library encrypts the sensitive fields of ledger records (amounts and
//! descriptions) with per-user symmetric keys, provides a resumable migration
//! that converts legacy plaintext rows in place without data loss, and a
//! verification pass that audits the result against a pre-migration backup
//! snapshot.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: master-secret configuration and path management
//! - `error`: custom error types
//! - `models`: core data models (records, money, ids)
//! - `crypto`: key derivation and authenticated field encryption
//! - `store`: the record store contract and its implementations
//! - `services`: the migration and verification engines
//! - `audit`: append-only run log
//! - `cli`: command handlers for the `ledgerlock` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use ledgerlock::config::EncryptionConfig;
//! use ledgerlock::crypto::FieldCipher;
//! use ledgerlock::services::MigrationService;
//! use ledgerlock::store::MemoryStore;
//!
//! let config = EncryptionConfig::from_env()?;
//! let cipher = FieldCipher::new(config);
//! let store = MemoryStore::new();
//! let report = MigrationService::new(&store, &cipher).migrate(user_id)?;
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::{LedgerError, LedgerResult};
