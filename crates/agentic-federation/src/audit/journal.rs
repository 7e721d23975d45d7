//! The per-entity audit log.
//!
//! Appends for one entity are serialized by a per-entity lock held across
//! the replay check, the side effect and the append. Different entities
//! proceed in parallel.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::auth::{Authorizer, Credential};
use crate::error::{FederationError, Result};
use crate::identity::EntityKey;
use crate::method::ActionId;

use super::entry::AuditEntry;

/// Durable storage of audit entries.
pub trait AuditStore: Send + Sync {
    /// Sequence number of the newest entry; 0 when there is none.
    fn last_sequence(&self, entity: &EntityKey) -> Result<u64>;

    fn append(&self, entry: &AuditEntry) -> Result<()>;

    /// Up to `limit` entries with a sequence number above `since`, in order.
    fn read_since(&self, entity: &EntityKey, since: u64, limit: usize) -> Result<Vec<AuditEntry>>;

    fn contains_action(&self, entity: &EntityKey, action: &ActionId) -> Result<bool>;
}

/// Audit log over a store, with per-entity serialization.
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
    locks: Mutex<HashMap<EntityKey, Arc<Mutex<()>>>>,
    page_limit: usize,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>, page_limit: usize) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            page_limit: page_limit.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    pub fn page_limit(&self) -> usize {
        self.page_limit
    }

    fn entity_lock(&self, entity: &EntityKey) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| FederationError::StorageError("audit lock table poisoned".into()))?;
        Ok(locks.entry(entity.clone()).or_default().clone())
    }

    /// Run `f` while holding the entity's lock.
    pub fn with_entity<T>(
        &self,
        entity: &EntityKey,
        f: impl FnOnce(&mut AuditSession<'_>) -> Result<T>,
    ) -> Result<T> {
        let lock = self.entity_lock(entity)?;
        let _guard = lock
            .lock()
            .map_err(|_| FederationError::StorageError(format!("audit lock for {entity} poisoned")))?;
        let mut session = AuditSession {
            store: self.store.as_ref(),
            entity,
            next: self.store.last_sequence(entity)? + 1,
        };
        f(&mut session)
    }

    /// Append one entry whose sequence number must be the next one.
    pub fn append_entry(&self, entry: AuditEntry) -> Result<()> {
        let entity = entry.entity.clone();
        self.with_entity(&entity, |session| session.append(entry))
    }

    pub fn last_sequence(&self, entity: &EntityKey) -> Result<u64> {
        self.store.last_sequence(entity)
    }

    /// Entries after `since` that `viewer` may see, fetched page by page.
    ///
    /// Entries the viewer may not see are skipped, never reported.
    pub fn read_entries<'a>(
        &'a self,
        entity: &EntityKey,
        since: u64,
        viewer: &'a Credential,
        authorizer: &'a Authorizer,
    ) -> AuditEntries<'a> {
        AuditEntries {
            log: self,
            entity: entity.clone(),
            cursor: since,
            examined: since,
            buffer: VecDeque::new(),
            exhausted: false,
            viewer,
            authorizer,
        }
    }
}

/// Exclusive access to one entity's log.
pub struct AuditSession<'a> {
    store: &'a dyn AuditStore,
    entity: &'a EntityKey,
    next: u64,
}

impl AuditSession<'_> {
    pub fn entity(&self) -> &EntityKey {
        self.entity
    }

    pub fn next_sequence(&self) -> u64 {
        self.next
    }

    pub fn contains_action(&self, action: &ActionId) -> Result<bool> {
        self.store.contains_action(self.entity, action)
    }

    pub fn append(&mut self, entry: AuditEntry) -> Result<()> {
        if &entry.entity != self.entity {
            return Err(FederationError::AuditAppend(format!(
                "entry for {} appended to {}",
                entry.entity, self.entity
            )));
        }
        if entry.sequence != self.next {
            return Err(FederationError::OutOfOrder {
                expected: self.next,
                actual: entry.sequence,
            });
        }
        self.store.append(&entry).map_err(|e| match e {
            FederationError::AuditAppend(_) => e,
            other => FederationError::AuditAppend(other.to_string()),
        })?;
        log::debug!(
            "audit {} #{}: {}",
            self.entity,
            entry.sequence,
            entry.descriptor.summary
        );
        self.next += 1;
        Ok(())
    }
}

/// Lazy, filtered iteration over an entity's log.
pub struct AuditEntries<'a> {
    log: &'a AuditLog,
    entity: EntityKey,
    cursor: u64,
    examined: u64,
    buffer: VecDeque<AuditEntry>,
    exhausted: bool,
    viewer: &'a Credential,
    authorizer: &'a Authorizer,
}

impl AuditEntries<'_> {
    /// Sequence number of the last entry looked at, shown or hidden.
    pub fn examined(&self) -> u64 {
        self.examined
    }
}

impl Iterator for AuditEntries<'_> {
    type Item = Result<AuditEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                self.examined = entry.sequence;
                if self.authorizer.can_see(&entry.requirements, self.viewer) {
                    return Some(Ok(entry));
                }
                continue;
            }
            if self.exhausted {
                return None;
            }
            let page = match self
                .log
                .store
                .read_since(&self.entity, self.cursor, self.log.page_limit)
            {
                Ok(page) => page,
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            };
            if page.len() < self.log.page_limit {
                self.exhausted = true;
            }
            if let Some(last) = page.last() {
                self.cursor = last.sequence;
            }
            self.buffer.extend(page);
        }
    }
}
