//! Property storage behind a single compare-and-swap primitive.
//!
//! A slot is one stored value: a scalar property, or one element of a set
//! or map property. Because set and map edits address single elements,
//! edits to different elements never conflict.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FederationError, Result};
use crate::identity::InternalIdentifier;

/// Name of a declared property table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyTableId(pub String);

impl PropertyTableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PropertyTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of one stored value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertySlot {
    pub table: PropertyTableId,
    pub subject: InternalIdentifier,
    /// Element key for set and map tables.
    pub element: Option<String>,
}

impl PropertySlot {
    pub fn value(table: PropertyTableId, subject: InternalIdentifier) -> Self {
        Self {
            table,
            subject,
            element: None,
        }
    }

    pub fn element(table: PropertyTableId, subject: InternalIdentifier, key: String) -> Self {
        Self {
            table,
            subject,
            element: Some(key),
        }
    }
}

impl fmt::Display for PropertySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.element {
            Some(key) => write!(f, "{}[{}]/{key}", self.table, self.subject),
            None => write!(f, "{}[{}]", self.table, self.subject),
        }
    }
}

/// A compare-and-swap that has been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub slot: PropertySlot,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

impl PropertyChange {
    /// The change that undoes this one.
    pub fn inverse(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }
}

/// Storage of property values.
pub trait PropertyStore: Send + Sync {
    fn get(&self, slot: &PropertySlot) -> Result<Option<Value>>;

    /// Replace the slot's value with `new` if it currently equals `old`.
    ///
    /// `None` means absent. Fails with `Conflict` and leaves the slot
    /// untouched when the current value differs.
    fn cas(&self, slot: &PropertySlot, old: Option<&Value>, new: Option<Value>) -> Result<()>;

    /// All element slots of a set or map property, by element key.
    fn elements(
        &self,
        table: &PropertyTableId,
        subject: &InternalIdentifier,
    ) -> Result<BTreeMap<String, Value>>;
}

/// Apply a change through the store's compare-and-swap.
pub fn apply_change(store: &dyn PropertyStore, change: &PropertyChange) -> Result<()> {
    store.cas(&change.slot, change.old.as_ref(), change.new.clone())
}

/// Undo applied changes, newest first.
///
/// Every inverse is attempted; the first failure is returned.
pub fn revert_changes(store: &dyn PropertyStore, changes: &[PropertyChange]) -> Result<()> {
    let mut first_error = None;
    for change in changes.iter().rev() {
        if let Err(e) = apply_change(store, &change.inverse()) {
            log::error!("could not revert {}: {e}", change.slot);
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// In-memory property store.
#[derive(Default)]
pub struct MemoryPropertyStore {
    slots: Mutex<HashMap<PropertySlot, Value>>,
}

impl MemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<PropertySlot, Value>>> {
        self.slots
            .lock()
            .map_err(|_| FederationError::StorageError("property store lock poisoned".into()))
    }
}

impl PropertyStore for MemoryPropertyStore {
    fn get(&self, slot: &PropertySlot) -> Result<Option<Value>> {
        Ok(self.lock()?.get(slot).cloned())
    }

    fn cas(&self, slot: &PropertySlot, old: Option<&Value>, new: Option<Value>) -> Result<()> {
        let mut slots = self.lock()?;
        if slots.get(slot) != old {
            return Err(FederationError::Conflict(format!(
                "{slot} does not hold the expected value"
            )));
        }
        match new {
            Some(value) => slots.insert(slot.clone(), value),
            None => slots.remove(slot),
        };
        Ok(())
    }

    fn elements(
        &self,
        table: &PropertyTableId,
        subject: &InternalIdentifier,
    ) -> Result<BTreeMap<String, Value>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(slot, _)| &slot.table == table && &slot.subject == subject)
            .filter_map(|(slot, value)| slot.element.clone().map(|k| (k, value.clone())))
            .collect())
    }
}
