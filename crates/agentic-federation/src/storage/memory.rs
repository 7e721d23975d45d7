//! In-memory audit store.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::audit::{AuditEntry, AuditStore};
use crate::error::{FederationError, Result};
use crate::identity::EntityKey;
use crate::method::ActionId;

#[derive(Default)]
struct EntityLog {
    entries: Vec<AuditEntry>,
    actions: HashMap<ActionId, u64>,
}

/// Audit entries kept in memory, per entity.
#[derive(Default)]
pub struct MemoryAuditStore {
    logs: RwLock<HashMap<EntityKey, EntityLog>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entries across all entities.
    pub fn len(&self) -> usize {
        self.logs
            .read()
            .map(|logs| logs.values().map(|l| l.entries.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> FederationError {
    FederationError::StorageError("audit store lock poisoned".into())
}

impl AuditStore for MemoryAuditStore {
    fn last_sequence(&self, entity: &EntityKey) -> Result<u64> {
        Ok(self
            .logs
            .read()
            .map_err(|_| poisoned())?
            .get(entity)
            .and_then(|l| l.entries.last())
            .map_or(0, |e| e.sequence))
    }

    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let mut logs = self.logs.write().map_err(|_| poisoned())?;
        let log = logs.entry(entry.entity.clone()).or_default();
        let expected = log.entries.last().map_or(0, |e| e.sequence) + 1;
        if entry.sequence != expected {
            return Err(FederationError::OutOfOrder {
                expected,
                actual: entry.sequence,
            });
        }
        log.actions.insert(entry.action().clone(), entry.sequence);
        log.entries.push(entry.clone());
        Ok(())
    }

    fn read_since(&self, entity: &EntityKey, since: u64, limit: usize) -> Result<Vec<AuditEntry>> {
        let logs = self.logs.read().map_err(|_| poisoned())?;
        let Some(log) = logs.get(entity) else {
            return Ok(Vec::new());
        };
        // Sequence n sits at index n - 1.
        let start = usize::try_from(since).unwrap_or(usize::MAX).min(log.entries.len());
        Ok(log.entries[start..].iter().take(limit).cloned().collect())
    }

    fn contains_action(&self, entity: &EntityKey, action: &ActionId) -> Result<bool> {
        Ok(self
            .logs
            .read()
            .map_err(|_| poisoned())?
            .get(entity)
            .is_some_and(|l| l.actions.contains_key(action)))
    }
}
