//! Authenticated field encryption with AES-256-GCM
//!
//! Encrypts and decrypts single scalar fields (an amount or a description)
//! with a per-user derived key. Each encryption uses a fresh random nonce, so
//! equal plaintexts in different records produce different ciphertexts and no
//! equality leaks between rows.
//!
//! The empty string is a sentinel on both sides: encrypting an empty value
//! yields an empty ciphertext, and any decryption failure yields an empty
//! plaintext (reported on the tracing channel, never a panic).

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::config::EncryptionConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::models::UserId;

use super::key_derivation::{derive_user_key, UserKey};

/// Size of the AES-GCM nonce in bytes (96 bits)
const NONCE_SIZE: usize = 12;

/// Version tag for future algorithm upgrades
const VERSION: &str = "v1";

/// Authenticated ciphertext for one scalar field
///
/// Stored as a single text value `v1:<base64 nonce>:<base64 ciphertext>` so it
/// fits in one database column. The empty string is the "no value" sentinel,
/// not an error state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedField(String);

impl EncryptedField {
    /// The empty-ciphertext sentinel
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Check whether this is the empty sentinel
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The stored text form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the text form from raw cipher output
    fn from_parts(nonce: &[u8], ciphertext: &[u8]) -> Self {
        Self(format!(
            "{}:{}:{}",
            VERSION,
            STANDARD.encode(nonce),
            STANDARD.encode(ciphertext)
        ))
    }

    /// Split the text form back into nonce and ciphertext bytes
    fn decode(&self) -> LedgerResult<(Vec<u8>, Vec<u8>)> {
        let mut parts = self.0.splitn(3, ':');
        let (version, nonce_b64, ciphertext_b64) = match (parts.next(), parts.next(), parts.next())
        {
            (Some(v), Some(n), Some(c)) => (v, n, c),
            _ => {
                return Err(LedgerError::Decryption(
                    "Malformed ciphertext encoding".to_string(),
                ))
            }
        };

        if version != VERSION {
            return Err(LedgerError::Decryption(format!(
                "Unsupported ciphertext version: {}",
                version
            )));
        }

        let nonce = STANDARD
            .decode(nonce_b64)
            .map_err(|e| LedgerError::Decryption(format!("Invalid nonce encoding: {}", e)))?;
        let ciphertext = STANDARD
            .decode(ciphertext_b64)
            .map_err(|e| LedgerError::Decryption(format!("Invalid ciphertext encoding: {}", e)))?;

        Ok((nonce, ciphertext))
    }
}

impl fmt::Display for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EncryptedField {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EncryptedField {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Encrypts and decrypts scalar fields with per-user keys
///
/// Holds the encryption configuration and a cache of derived keys; derivation
/// is expensive, so the first operation for a user pays the Argon2 cost and
/// later ones reuse the cached key.
pub struct FieldCipher {
    config: EncryptionConfig,
    keys: RwLock<HashMap<UserId, UserKey>>,
}

impl FieldCipher {
    /// Create a cipher from a validated configuration
    pub fn new(config: EncryptionConfig) -> Self {
        Self {
            config,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Encrypt one scalar field for a user
    ///
    /// Empty input returns the empty sentinel, not an error. Any key-derivation
    /// or cipher failure propagates as `LedgerError::Encryption`.
    pub fn encrypt_field(&self, plaintext: &str, user_id: UserId) -> LedgerResult<EncryptedField> {
        if plaintext.is_empty() {
            return Ok(EncryptedField::empty());
        }

        self.with_user_key(user_id, |key| {
            let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| LedgerError::Encryption(format!("Failed to create cipher: {}", e)))?;

            let mut nonce_bytes = [0u8; NONCE_SIZE];
            OsRng.fill_bytes(&mut nonce_bytes);
            let nonce = Nonce::from_slice(&nonce_bytes);

            let ciphertext = cipher
                .encrypt(nonce, plaintext.as_bytes())
                .map_err(|e| LedgerError::Encryption(format!("Encryption failed: {}", e)))?;

            Ok(EncryptedField::from_parts(&nonce_bytes, &ciphertext))
        })
    }

    /// Decrypt one scalar field, recovering failures as the empty sentinel
    ///
    /// Empty ciphertext yields the empty string. Wrong key, tampered data, or
    /// malformed encoding also yield the empty string, with the failure emitted
    /// as a structured tracing event so callers can tell "legitimately empty"
    /// from "decryption failed". Never panics.
    pub fn decrypt_field(&self, field: &EncryptedField, user_id: UserId) -> String {
        match self.try_decrypt_field(field, user_id) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!(user = %user_id, error = %e, "field decryption failed");
                String::new()
            }
        }
    }

    /// Checked decryption for callers that must distinguish failure from empty
    ///
    /// Migration and verification use this variant; routine reads use
    /// [`decrypt_field`](Self::decrypt_field).
    pub fn try_decrypt_field(
        &self,
        field: &EncryptedField,
        user_id: UserId,
    ) -> LedgerResult<String> {
        if field.is_empty() {
            return Ok(String::new());
        }

        let (nonce_bytes, ciphertext) = field.decode()?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(LedgerError::Decryption(format!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                nonce_bytes.len()
            )));
        }

        self.with_user_key(user_id, |key| {
            let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| LedgerError::Decryption(format!("Failed to create cipher: {}", e)))?;

            let nonce = Nonce::from_slice(&nonce_bytes);
            let plaintext = cipher.decrypt(nonce, ciphertext.as_ref()).map_err(|_| {
                LedgerError::Decryption("Invalid key or corrupted ciphertext".to_string())
            })?;

            String::from_utf8(plaintext).map_err(|e| {
                LedgerError::Decryption(format!("Invalid UTF-8 in decrypted data: {}", e))
            })
        })
    }

    /// Run a closure with the derived key for a user, deriving and caching it
    /// on first use
    fn with_user_key<T>(
        &self,
        user_id: UserId,
        f: impl FnOnce(&UserKey) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        {
            let cache = self
                .keys
                .read()
                .map_err(|_| LedgerError::Encryption("Key cache lock poisoned".to_string()))?;
            if let Some(key) = cache.get(&user_id) {
                return f(key);
            }
        }

        let derived = derive_user_key(&self.config, user_id)?;
        let mut cache = self
            .keys
            .write()
            .map_err(|_| LedgerError::Encryption("Key cache lock poisoned".to_string()))?;
        f(cache.entry(user_id).or_insert(derived))
    }
}
