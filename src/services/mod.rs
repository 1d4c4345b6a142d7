//! Service layer for LedgerLock
//!
//! The migration and verification engines sit on top of the store contract
//! and the field cipher; all persistence goes through `RecordStore` and all
//! cryptography through `FieldCipher`.

pub mod migration;
pub mod verification;

pub use migration::{
    MigrationOptions, MigrationProgress, MigrationReport, MigrationService, MigrationStats,
    RunState,
};
pub use verification::{VerificationReport, VerificationService, DEFAULT_SAMPLE_SIZE};
