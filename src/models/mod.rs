//! Core data models for LedgerLock
//!
//! Defines the ledger record, money representation, and strongly-typed IDs
//! shared by the crypto, store, and service layers.

pub mod ids;
pub mod money;
pub mod record;

pub use ids::{CategoryId, RecordId, UserId};
pub use money::{Money, MoneyParseError};
pub use record::Record;
