//! Configuration and path management for LedgerLock

pub mod paths;
pub mod settings;

pub use paths::Paths;
pub use settings::{EncryptionConfig, MASTER_KEY_ENV, MIN_MASTER_KEY_LEN};
