//! Cryptographic functions for LedgerLock
//!
//! Provides AES-256-GCM field encryption with deterministic per-user Argon2id
//! key derivation from a process-wide master secret.

pub mod field_cipher;
pub mod key_derivation;
pub mod secure_memory;

pub use field_cipher::{EncryptedField, FieldCipher};
pub use key_derivation::{derive_user_key, KdfParams, UserKey};
pub use secure_memory::SecureString;
