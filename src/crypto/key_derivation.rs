//! Per-user key derivation using Argon2id
//!
//! Derives a 256-bit encryption key from the process-wide master secret and a
//! user id. Derivation is deterministic: the user id is the salt and the
//! parameters are fixed, so the same (secret, user) pair always yields the same
//! key, while different users get unrelated keys.

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, Params,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::config::EncryptionConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::models::UserId;

/// Parameters for key derivation
///
/// No salt field: the salt is always the owning user's id, which is what makes
/// derivation deterministic per user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism degree (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Create params with specific values
    pub fn with_values(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            memory_cost,
            time_cost,
            parallelism,
        }
    }
}

/// A derived per-user encryption key
pub struct UserKey {
    /// The 32-byte key for AES-256
    key: [u8; 32],
}

impl UserKey {
    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl Drop for UserKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Derive the encryption key for one user
///
/// Pure function: no I/O, no caching. `FieldCipher` caches the result per user
/// because Argon2id derivation is deliberately expensive.
pub fn derive_user_key(config: &EncryptionConfig, user_id: UserId) -> LedgerResult<UserKey> {
    // The user id is the salt, so derivation is deterministic per user
    let salt = SaltString::encode_b64(user_id.as_uuid().as_bytes())
        .map_err(|e| LedgerError::Encryption(format!("Invalid salt: {}", e)))?;

    let kdf = config.kdf();
    let argon2_params = Params::new(
        kdf.memory_cost,
        kdf.time_cost,
        kdf.parallelism,
        Some(32), // Output length for AES-256
    )
    .map_err(|e| LedgerError::Encryption(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let hash = argon2
        .hash_password(config.master_secret().as_bytes(), &salt)
        .map_err(|e| LedgerError::Encryption(format!("Key derivation failed: {}", e)))?;

    let hash_output = hash
        .hash
        .ok_or_else(|| LedgerError::Encryption("No hash output generated".to_string()))?;

    let hash_bytes = hash_output.as_bytes();

    if hash_bytes.len() < 32 {
        return Err(LedgerError::Encryption(
            "Hash output too short for AES-256 key".to_string(),
        ));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&hash_bytes[..32]);

    Ok(UserKey { key })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EncryptionConfig {
        EncryptionConfig::new(
            "an-example-master-secret-at-least-32-chars",
            KdfParams::with_values(8192, 1, 1),
        )
        .unwrap()
    }

    #[test]
    fn test_derive_key_length() {
        let config = test_config();
        let key = derive_user_key(&config, UserId::new()).unwrap();
        assert_eq!(key.as_bytes().len(), 32);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let config = test_config();
        let user = UserId::new();
        let key1 = derive_user_key(&config, user).unwrap();
        let key2 = derive_user_key(&config, user).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_users_different_keys() {
        let config = test_config();
        let key1 = derive_user_key(&config, UserId::new()).unwrap();
        let key2 = derive_user_key(&config, UserId::new()).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_secrets_different_keys() {
        let user = UserId::new();
        let config1 = test_config();
        let config2 = EncryptionConfig::new(
            "a-different-master-secret-also-32-chars-long",
            KdfParams::with_values(8192, 1, 1),
        )
        .unwrap();
        let key1 = derive_user_key(&config1, user).unwrap();
        let key2 = derive_user_key(&config2, user).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }
}
