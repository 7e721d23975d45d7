//! Storage backends.
//!
//! - [`memory`]: in-memory `AuditStore` for embedding and tests.
//! - [`failure_store`]: one JSON file per push failure record.
//!
//! Property stores live with the property module
//! ([`crate::property::MemoryPropertyStore`]).

pub mod failure_store;
pub mod memory;

pub use failure_store::FileFailureStore;
pub use memory::MemoryAuditStore;
