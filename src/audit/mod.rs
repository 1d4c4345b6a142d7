//! Audit logging for migration and verification runs
//!
//! Provides an append-only JSONL trail of per-record outcomes. Attaching a
//! logger to the engines is optional; audit write failures are reported on the
//! tracing channel and never abort a run.

pub mod entry;
pub mod logger;

pub use entry::{AuditEntry, AuditEvent};
pub use logger::AuditLogger;
