//! Declared property tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::auth::{Access, Permissions, Requirements, Restrictions};
use crate::error::{FederationError, Result};

use super::store::PropertyTableId;

/// Shape of a property table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyFlavor {
    /// One value per subject.
    Value,
    /// Unordered unique elements.
    Set,
    /// String-keyed entries.
    Map,
}

/// A declared table and the rights needed to use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyTable {
    pub id: PropertyTableId,
    pub flavor: PropertyFlavor,
    /// Permission name checked with `Access::Read` for reads.
    pub read_permission: String,
    /// Permission name checked with `Access::Write` for edits.
    pub write_permission: String,
    /// Restrictions required for edits.
    pub write_restrictions: Restrictions,
}

impl PropertyTable {
    pub fn new(id: &str, flavor: PropertyFlavor, permission: &str) -> Self {
        Self {
            id: PropertyTableId::new(id),
            flavor,
            read_permission: permission.to_string(),
            write_permission: permission.to_string(),
            write_restrictions: Restrictions::none().client(),
        }
    }

    pub fn write_restrictions(mut self, restrictions: Restrictions) -> Self {
        self.write_restrictions = restrictions;
        self
    }

    pub fn read_requirements(&self) -> Requirements {
        Requirements::none().permissions(Permissions::new().with(&self.read_permission, Access::Read))
    }

    pub fn write_requirements(&self) -> Requirements {
        Requirements::none()
            .permissions(Permissions::new().with(&self.write_permission, Access::Write))
            .restrictions(self.write_restrictions.clone())
    }
}

/// The tables a host knows about.
#[derive(Debug, Clone, Default)]
pub struct PropertyCatalog {
    tables: BTreeMap<PropertyTableId, PropertyTable>,
}

impl PropertyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tables every identity has.
    pub fn core() -> Self {
        let mut catalog = Self::new();
        catalog.declare(PropertyTable::new(
            "attribute.name",
            PropertyFlavor::Value,
            "attribute:name",
        ));
        catalog.declare(PropertyTable::new(
            "attribute.email",
            PropertyFlavor::Value,
            "attribute:email",
        ));
        catalog.declare(PropertyTable::new("contacts", PropertyFlavor::Set, "contact:list"));
        catalog.declare(PropertyTable::new("settings", PropertyFlavor::Map, "settings"));
        // Written by other hosts through access.request, not by clients.
        catalog.declare(
            PropertyTable::new(
                super::access::ACCESS_REQUESTS_TABLE,
                PropertyFlavor::Map,
                "access:requests",
            )
            .write_restrictions(Restrictions::none()),
        );
        catalog
    }

    /// Add or replace a table declaration.
    pub fn declare(&mut self, table: PropertyTable) {
        self.tables.insert(table.id.clone(), table);
    }

    pub fn get(&self, id: &PropertyTableId) -> Result<&PropertyTable> {
        self.tables
            .get(id)
            .ok_or_else(|| FederationError::NotFound(format!("property table {id}")))
    }

    /// Look up a table and check its flavor.
    pub fn expect(&self, id: &PropertyTableId, flavor: PropertyFlavor) -> Result<&PropertyTable> {
        let table = self.get(id)?;
        if table.flavor != flavor {
            return Err(FederationError::MalformedMethod(format!(
                "{id} is a {:?} table, not {flavor:?}",
                table.flavor
            )));
        }
        Ok(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &PropertyTable> {
        self.tables.values()
    }
}
