//! Property methods: edits of value, set and map tables, and reads.
//!
//! Every edit is a single compare-and-swap on one slot. The handlers
//! report the applied change so the executor can revert it if the audit
//! append fails.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::auth::Requirements;
use crate::error::{FederationError, Result};
use crate::identity::Entity;
use crate::method::{
    create_method, Execution, ExecutionContext, Method, MethodHandler, MethodKind, MethodScope,
    MethodType,
};

use super::catalog::{PropertyCatalog, PropertyFlavor, PropertyTable};
use super::store::{apply_change, PropertyChange, PropertySlot, PropertyStore, PropertyTableId};

pub const VALUE_REPLACE: &str = "property.value.replace";
pub const SET_MODIFY: &str = "property.set.modify";
pub const MAP_MODIFY: &str = "property.map.modify";
pub const PROPERTY_GET: &str = "property.get";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueReplace {
    pub table: PropertyTableId,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetOperation {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetModify {
    pub table: PropertyTableId,
    pub element: Value,
    pub operation: SetOperation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapModify {
    pub table: PropertyTableId,
    pub key: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyGet {
    pub table: PropertyTableId,
    /// Single map entry; `None` reads the whole property.
    pub key: Option<String>,
}

/// Storage key of a set element.
pub fn set_element_key(element: &Value) -> String {
    hex::encode(Sha256::digest(element.to_string().as_bytes()))
}

fn internal_method<T: Serialize>(
    kind: MethodKind,
    method_type: &str,
    entity: &Entity,
    payload: &T,
) -> Result<Method> {
    let subject = entity.identity().address.clone();
    create_method(
        kind,
        MethodScope::Internal,
        MethodType::new(method_type),
        Some(entity),
        subject.clone(),
        subject.host(),
        serde_json::to_vec(payload).map_err(|e| FederationError::SerializationError(e.to_string()))?,
    )
}

/// Replace the value of a scalar property of the entity's identity.
pub fn replace_value(
    entity: &Entity,
    table: &str,
    old: Option<Value>,
    new: Option<Value>,
) -> Result<Method> {
    internal_method(
        MethodKind::Action,
        VALUE_REPLACE,
        entity,
        &ValueReplace {
            table: PropertyTableId::new(table),
            old,
            new,
        },
    )
}

/// Add or remove one element of a set property.
pub fn modify_set(
    entity: &Entity,
    table: &str,
    element: Value,
    operation: SetOperation,
) -> Result<Method> {
    internal_method(
        MethodKind::Action,
        SET_MODIFY,
        entity,
        &SetModify {
            table: PropertyTableId::new(table),
            element,
            operation,
        },
    )
}

/// Compare-and-swap one entry of a map property.
pub fn modify_map(
    entity: &Entity,
    table: &str,
    key: &str,
    old: Option<Value>,
    new: Option<Value>,
) -> Result<Method> {
    internal_method(
        MethodKind::Action,
        MAP_MODIFY,
        entity,
        &MapModify {
            table: PropertyTableId::new(table),
            key: key.to_string(),
            old,
            new,
        },
    )
}

/// Read a property of the entity's identity.
pub fn get_property(entity: &Entity, table: &str, key: Option<&str>) -> Result<Method> {
    internal_method(
        MethodKind::Query,
        PROPERTY_GET,
        entity,
        &PropertyGet {
            table: PropertyTableId::new(table),
            key: key.map(str::to_string),
        },
    )
}

fn table_for<'a>(
    catalog: &'a PropertyCatalog,
    table: &PropertyTableId,
    flavor: PropertyFlavor,
) -> Result<&'a PropertyTable> {
    catalog
        .expect(table, flavor)
        .map_err(|e| FederationError::Decoding(e.to_string()))
}

fn applied(change: PropertyChange) -> Result<Execution> {
    Ok(Execution::reply(&json!({ "applied": change.slot.to_string() }))?.with_change(change))
}

pub struct ValueReplaceHandler {
    catalog: Arc<PropertyCatalog>,
}

impl ValueReplaceHandler {
    pub fn new(catalog: Arc<PropertyCatalog>) -> Self {
        Self { catalog }
    }

    fn change(&self, method: &Method) -> Result<PropertyChange> {
        let edit: ValueReplace = method.payload_as()?;
        table_for(&self.catalog, &edit.table, PropertyFlavor::Value)?;
        Ok(PropertyChange {
            slot: PropertySlot::value(edit.table, method.subject.clone()),
            old: edit.old,
            new: edit.new,
        })
    }
}

impl MethodHandler for ValueReplaceHandler {
    fn method_type(&self) -> MethodType {
        MethodType::new(VALUE_REPLACE)
    }

    fn kind(&self) -> MethodKind {
        MethodKind::Action
    }

    fn validate(&self, method: &Method) -> Result<()> {
        self.change(method).map(|_| ())
    }

    fn requirements(&self, method: &Method) -> Result<Requirements> {
        let edit: ValueReplace = method.payload_as()?;
        Ok(table_for(&self.catalog, &edit.table, PropertyFlavor::Value)?.write_requirements())
    }

    fn audit_requirements(&self, method: &Method) -> Result<Requirements> {
        let edit: ValueReplace = method.payload_as()?;
        Ok(table_for(&self.catalog, &edit.table, PropertyFlavor::Value)?.read_requirements())
    }

    fn describe(&self, method: &Method) -> String {
        match method.payload_as::<ValueReplace>() {
            Ok(edit) => format!("replace {} of {}", edit.table, method.subject),
            Err(_) => format!("replace value of {}", method.subject),
        }
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, method: &Method) -> Result<Execution> {
        let change = self.change(method)?;
        apply_change(ctx.properties, &change)?;
        applied(change)
    }

    fn replay(&self, properties: &dyn PropertyStore, method: &Method) -> Result<()> {
        apply_change(properties, &self.change(method)?)
    }
}

pub struct SetModifyHandler {
    catalog: Arc<PropertyCatalog>,
}

impl SetModifyHandler {
    pub fn new(catalog: Arc<PropertyCatalog>) -> Self {
        Self { catalog }
    }

    fn change(&self, method: &Method) -> Result<PropertyChange> {
        let edit: SetModify = method.payload_as()?;
        table_for(&self.catalog, &edit.table, PropertyFlavor::Set)?;
        let slot = PropertySlot::element(
            edit.table,
            method.subject.clone(),
            set_element_key(&edit.element),
        );
        let (old, new) = match edit.operation {
            SetOperation::Add => (None, Some(edit.element)),
            SetOperation::Remove => (Some(edit.element), None),
        };
        Ok(PropertyChange { slot, old, new })
    }
}

impl MethodHandler for SetModifyHandler {
    fn method_type(&self) -> MethodType {
        MethodType::new(SET_MODIFY)
    }

    fn kind(&self) -> MethodKind {
        MethodKind::Action
    }

    fn validate(&self, method: &Method) -> Result<()> {
        self.change(method).map(|_| ())
    }

    fn requirements(&self, method: &Method) -> Result<Requirements> {
        let edit: SetModify = method.payload_as()?;
        Ok(table_for(&self.catalog, &edit.table, PropertyFlavor::Set)?.write_requirements())
    }

    fn audit_requirements(&self, method: &Method) -> Result<Requirements> {
        let edit: SetModify = method.payload_as()?;
        Ok(table_for(&self.catalog, &edit.table, PropertyFlavor::Set)?.read_requirements())
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, method: &Method) -> Result<Execution> {
        let change = self.change(method)?;
        apply_change(ctx.properties, &change)?;
        applied(change)
    }

    fn replay(&self, properties: &dyn PropertyStore, method: &Method) -> Result<()> {
        apply_change(properties, &self.change(method)?)
    }
}

pub struct MapModifyHandler {
    catalog: Arc<PropertyCatalog>,
}

impl MapModifyHandler {
    pub fn new(catalog: Arc<PropertyCatalog>) -> Self {
        Self { catalog }
    }

    fn change(&self, method: &Method) -> Result<PropertyChange> {
        let edit: MapModify = method.payload_as()?;
        table_for(&self.catalog, &edit.table, PropertyFlavor::Map)?;
        Ok(PropertyChange {
            slot: PropertySlot::element(edit.table, method.subject.clone(), edit.key),
            old: edit.old,
            new: edit.new,
        })
    }
}

impl MethodHandler for MapModifyHandler {
    fn method_type(&self) -> MethodType {
        MethodType::new(MAP_MODIFY)
    }

    fn kind(&self) -> MethodKind {
        MethodKind::Action
    }

    fn validate(&self, method: &Method) -> Result<()> {
        self.change(method).map(|_| ())
    }

    fn requirements(&self, method: &Method) -> Result<Requirements> {
        let edit: MapModify = method.payload_as()?;
        Ok(table_for(&self.catalog, &edit.table, PropertyFlavor::Map)?.write_requirements())
    }

    fn audit_requirements(&self, method: &Method) -> Result<Requirements> {
        let edit: MapModify = method.payload_as()?;
        Ok(table_for(&self.catalog, &edit.table, PropertyFlavor::Map)?.read_requirements())
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, method: &Method) -> Result<Execution> {
        let change = self.change(method)?;
        apply_change(ctx.properties, &change)?;
        applied(change)
    }

    fn replay(&self, properties: &dyn PropertyStore, method: &Method) -> Result<()> {
        apply_change(properties, &self.change(method)?)
    }
}

pub struct PropertyGetHandler {
    catalog: Arc<PropertyCatalog>,
}

impl PropertyGetHandler {
    pub fn new(catalog: Arc<PropertyCatalog>) -> Self {
        Self { catalog }
    }

    fn table(&self, method: &Method) -> Result<(PropertyGet, &PropertyTable)> {
        let read: PropertyGet = method.payload_as()?;
        let table = self
            .catalog
            .get(&read.table)
            .map_err(|e| FederationError::Decoding(e.to_string()))?;
        Ok((read, table))
    }
}

impl MethodHandler for PropertyGetHandler {
    fn method_type(&self) -> MethodType {
        MethodType::new(PROPERTY_GET)
    }

    fn kind(&self) -> MethodKind {
        MethodKind::Query
    }

    fn validate(&self, method: &Method) -> Result<()> {
        self.table(method).map(|_| ())
    }

    fn requirements(&self, method: &Method) -> Result<Requirements> {
        Ok(self.table(method)?.1.read_requirements())
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, method: &Method) -> Result<Execution> {
        let (read, table) = self.table(method)?;
        let subject = &method.subject;
        let value = match (table.flavor, read.key) {
            (PropertyFlavor::Value, _) => ctx
                .properties
                .get(&PropertySlot::value(read.table, subject.clone()))?
                .unwrap_or(Value::Null),
            (PropertyFlavor::Map, Some(key)) => ctx
                .properties
                .get(&PropertySlot::element(read.table, subject.clone(), key))?
                .unwrap_or(Value::Null),
            (PropertyFlavor::Map, None) => {
                Value::Object(ctx.properties.elements(&read.table, subject)?.into_iter().collect())
            }
            (PropertyFlavor::Set, _) => Value::Array(
                ctx.properties
                    .elements(&read.table, subject)?
                    .into_values()
                    .collect(),
            ),
        };
        Execution::reply(&value)
    }
}
