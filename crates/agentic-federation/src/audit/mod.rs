//! Audit: the ordered record of executed actions.
//!
//! - `entry`: what is recorded per action
//! - `journal`: per-entity serialized appends and filtered reads
//! - `query`: the `audit.read` method
//! - `sync`: replicas replaying entries into a local property store

pub mod entry;
pub mod journal;
pub mod query;
pub mod sync;

pub use entry::{ActionDescriptor, AuditEntry};
pub use journal::{AuditEntries, AuditLog, AuditSession, AuditStore};
pub use query::{read_audit, AuditPage, AuditRead, AuditReadHandler, AUDIT_READ};
pub use sync::Replica;
