//! Properties: typed, per-identity state changed only by actions.
//!
//! - `store`: slots and the compare-and-swap primitive
//! - `catalog`: declared tables with their permissions
//! - `actions`: value, set and map edits plus reads
//! - `access`: cross-host access requests landing in a map property

pub mod access;
pub mod actions;
pub mod catalog;
pub mod store;

pub use access::{request_access, AccessRequest, AccessRequestHandler, ACCESS_REQUEST};
pub use actions::{
    get_property, modify_map, modify_set, replace_value, set_element_key, MapModify,
    MapModifyHandler, PropertyGet, PropertyGetHandler, SetModify, SetModifyHandler, SetOperation,
    ValueReplace, ValueReplaceHandler, MAP_MODIFY, PROPERTY_GET, SET_MODIFY, VALUE_REPLACE,
};
pub use catalog::{PropertyCatalog, PropertyFlavor, PropertyTable};
pub use store::{
    apply_change, revert_changes, MemoryPropertyStore, PropertyChange, PropertySlot,
    PropertyStore, PropertyTableId,
};
