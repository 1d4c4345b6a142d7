//! Encryption configuration
//!
//! The master secret is read from the environment exactly once, at process
//! start, and carried in an explicit `EncryptionConfig` value from then on.
//! Cryptographic functions never read the environment themselves.

use crate::crypto::key_derivation::KdfParams;
use crate::crypto::secure_memory::SecureString;
use crate::error::{LedgerError, LedgerResult};

/// Environment variable holding the master secret
pub const MASTER_KEY_ENV: &str = "LEDGERLOCK_MASTER_KEY";

/// Minimum master secret length in characters (entropy floor)
pub const MIN_MASTER_KEY_LEN: usize = 32;

/// Validated encryption configuration
///
/// Construction is the configuration check: once an `EncryptionConfig` exists,
/// the master secret is known to be present and long enough.
#[derive(Debug)]
pub struct EncryptionConfig {
    master_secret: SecureString,
    kdf: KdfParams,
}

impl EncryptionConfig {
    /// Create a configuration from an explicit secret
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Config` if the secret is shorter than
    /// [`MIN_MASTER_KEY_LEN`] characters.
    pub fn new(master_secret: impl Into<String>, kdf: KdfParams) -> LedgerResult<Self> {
        let master_secret: String = master_secret.into();

        if master_secret.is_empty() {
            return Err(LedgerError::Config(format!(
                "{} is not set",
                MASTER_KEY_ENV
            )));
        }

        if master_secret.chars().count() < MIN_MASTER_KEY_LEN {
            return Err(LedgerError::Config(format!(
                "{} must be at least {} characters",
                MASTER_KEY_ENV, MIN_MASTER_KEY_LEN
            )));
        }

        Ok(Self {
            master_secret: SecureString::new(master_secret),
            kdf,
        })
    }

    /// Create a configuration from the environment with default KDF parameters
    pub fn from_env() -> LedgerResult<Self> {
        let secret = std::env::var(MASTER_KEY_ENV)
            .map_err(|_| LedgerError::Config(format!("{} is not set", MASTER_KEY_ENV)))?;
        Self::new(secret, KdfParams::default())
    }

    /// The validated master secret
    pub fn master_secret(&self) -> &str {
        self.master_secret.as_str()
    }

    /// Key derivation parameters
    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }
}
