//! Durable failure records for push deliveries that gave up.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{FederationError, Result};
use crate::identity::HostIdentifier;
use crate::method::Method;

use super::task::DeliveryToken;

/// Unique identifier for a failure record.
///
/// Format: `afail_` + base58 of first 16 bytes of SHA-256(token, failed_at).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FailureId(pub String);

impl fmt::Display for FailureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An external action that could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: FailureId,
    pub token: DeliveryToken,
    pub recipient: HostIdentifier,
    /// The undelivered action, as submitted.
    pub action: Method,
    pub last_error: String,
    pub attempts: u32,
    pub failed_at: u64,
}

impl FailureRecord {
    pub fn new(token: DeliveryToken, action: Method, last_error: String, attempts: u32) -> Self {
        let failed_at = crate::time::now_micros();
        let hash = Sha256::digest(format!("failure:{}:{failed_at}", token.0).as_bytes());
        Self {
            id: FailureId(format!("afail_{}", bs58::encode(&hash[..16]).into_string())),
            token,
            recipient: action.recipient.clone(),
            action,
            last_error,
            attempts,
            failed_at,
        }
    }
}

/// Persistence for failure records.
pub trait FailureStore: Send + Sync {
    /// Persist a record; an existing record with the same id is replaced.
    fn save(&self, record: &FailureRecord) -> Result<()>;

    /// Fails with `NotFound` for an unknown id.
    fn load(&self, id: &FailureId) -> Result<FailureRecord>;

    fn list(&self) -> Result<Vec<FailureId>>;

    /// Deleting an unknown id is not an error.
    fn delete(&self, id: &FailureId) -> Result<()>;
}

/// Failure records kept in memory.
#[derive(Default)]
pub struct MemoryFailureStore {
    records: RwLock<BTreeMap<FailureId, FailureRecord>>,
}

impl MemoryFailureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> FederationError {
    FederationError::StorageError("failure store lock poisoned".into())
}

impl FailureStore for MemoryFailureStore {
    fn save(&self, record: &FailureRecord) -> Result<()> {
        self.records
            .write()
            .map_err(|_| poisoned())?
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn load(&self, id: &FailureId) -> Result<FailureRecord> {
        self.records
            .read()
            .map_err(|_| poisoned())?
            .get(id)
            .cloned()
            .ok_or_else(|| FederationError::NotFound(format!("failure record not found: {id}")))
    }

    fn list(&self) -> Result<Vec<FailureId>> {
        Ok(self.records.read().map_err(|_| poisoned())?.keys().cloned().collect())
    }

    fn delete(&self, id: &FailureId) -> Result<()> {
        self.records.write().map_err(|_| poisoned())?.remove(id);
        Ok(())
    }
}
