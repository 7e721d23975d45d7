//! Client-side replicas brought up to date from the audit log.
//!
//! A replica keeps the sequence number of the last entry it applied and
//! replays newer entries, strictly in order, through the handler of each
//! recorded method. Pages from `audit.read` also carry the sequence they
//! were read through, which lets a replica pass entries its reader may
//! not see.

use std::sync::Arc;

use crate::error::{FederationError, Result};
use crate::identity::EntityKey;
use crate::method::MethodRegistry;
use crate::property::PropertyStore;

use super::entry::AuditEntry;
use super::query::AuditPage;

pub struct Replica {
    entity: EntityKey,
    applied: u64,
    properties: Arc<dyn PropertyStore>,
    registry: Arc<MethodRegistry>,
}

impl Replica {
    pub fn new(
        entity: EntityKey,
        properties: Arc<dyn PropertyStore>,
        registry: Arc<MethodRegistry>,
    ) -> Self {
        Self {
            entity,
            applied: 0,
            properties,
            registry,
        }
    }

    pub fn entity(&self) -> &EntityKey {
        &self.entity
    }

    /// Sequence number of the last applied entry.
    pub fn applied_sequence(&self) -> u64 {
        self.applied
    }

    pub fn properties(&self) -> &Arc<dyn PropertyStore> {
        &self.properties
    }

    /// Apply the entries not yet applied; returns how many were.
    ///
    /// Entries at or below the applied sequence are skipped. A gap stops
    /// replay with `OutOfOrder`, leaving earlier entries applied.
    pub fn apply(&mut self, entries: impl IntoIterator<Item = AuditEntry>) -> Result<usize> {
        let mut count = 0;
        for entry in entries {
            if entry.sequence <= self.applied {
                self.check_entity(&entry)?;
                continue;
            }
            if entry.sequence != self.applied + 1 {
                return Err(FederationError::OutOfOrder {
                    expected: self.applied + 1,
                    actual: entry.sequence,
                });
            }
            self.replay(&entry)?;
            count += 1;
        }
        self.log_progress(count);
        Ok(count)
    }

    /// Apply an `audit.read` page.
    ///
    /// Sequences up to `page.through` that the page leaves out were hidden
    /// from the reader and count as applied. The page must start at or
    /// before the applied sequence.
    pub fn apply_page(&mut self, page: &AuditPage) -> Result<usize> {
        if page.since > self.applied {
            return Err(FederationError::OutOfOrder {
                expected: self.applied + 1,
                actual: page.since + 1,
            });
        }
        let mut count = 0;
        for entry in &page.entries {
            if entry.sequence > page.through {
                return Err(FederationError::MalformedMethod(format!(
                    "entry #{} beyond page end #{}",
                    entry.sequence, page.through
                )));
            }
            if entry.sequence <= self.applied {
                self.check_entity(entry)?;
                continue;
            }
            self.replay(entry)?;
            count += 1;
        }
        self.applied = self.applied.max(page.through);
        self.log_progress(count);
        Ok(count)
    }

    fn check_entity(&self, entry: &AuditEntry) -> Result<()> {
        if entry.entity != self.entity {
            return Err(FederationError::MalformedMethod(format!(
                "entry of {} offered to replica of {}",
                entry.entity, self.entity
            )));
        }
        Ok(())
    }

    fn replay(&mut self, entry: &AuditEntry) -> Result<()> {
        self.check_entity(entry)?;
        let method = entry.method()?;
        self.registry
            .get(&method.method_type)?
            .replay(self.properties.as_ref(), &method)?;
        self.applied = entry.sequence;
        Ok(())
    }

    fn log_progress(&self, count: usize) {
        if count > 0 {
            log::debug!("replica of {} now at #{}", self.entity, self.applied);
        }
    }
}
