//! Method handlers and the registry that selects them by type tag.
//!
//! The registry is the only place that knows which method types exist.
//! Services add their own handlers with [`MethodRegistry::register`]; the
//! envelope, codec and executor stay unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::audit::AuditLog;
use crate::auth::{Authorizer, Credential, Requirements, SubjectBinding};
use crate::error::{FederationError, Result};
use crate::identity::{Account, HostIdentifier};
use crate::property::{PropertyCatalog, PropertyChange, PropertyStore};

use super::types::{Method, MethodKind, MethodType};

/// Everything a handler may touch while executing on a host.
pub struct ExecutionContext<'a> {
    pub host: &'a HostIdentifier,
    /// The account the method acts on.
    pub account: &'a Account,
    pub credential: Option<&'a Credential>,
    pub properties: &'a dyn PropertyStore,
    pub audit: &'a AuditLog,
    pub authorizer: &'a Authorizer,
}

/// Result of executing a method.
#[derive(Debug, Default)]
pub struct Execution {
    /// Reply content (JSON).
    pub content: Vec<u8>,
    /// Property changes already applied, in order. Reverted if the audit
    /// append fails.
    pub changes: Vec<PropertyChange>,
}

impl Execution {
    pub fn reply<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self {
            content: serde_json::to_vec(value)
                .map_err(|e| FederationError::SerializationError(e.to_string()))?,
            changes: Vec::new(),
        })
    }

    pub fn with_change(mut self, change: PropertyChange) -> Self {
        self.changes.push(change);
        self
    }
}

/// Behaviour behind one method type.
pub trait MethodHandler: Send + Sync {
    fn method_type(&self) -> MethodType;

    fn kind(&self) -> MethodKind;

    /// Check the payload is well formed. Errors are `Decoding`.
    fn validate(&self, method: &Method) -> Result<()>;

    /// What the acting credential must hold. Recomputed by the executing
    /// host; the issuing side only uses it to fail fast.
    fn requirements(&self, method: &Method) -> Result<Requirements>;

    /// Which presented credentials may act on the method's subject.
    fn subject_binding(&self) -> SubjectBinding {
        SubjectBinding::Subject
    }

    /// What a reader must hold to see the audit entry of this action.
    fn audit_requirements(&self, method: &Method) -> Result<Requirements> {
        self.requirements(method)
    }

    /// Short human-readable description for audit listings.
    fn describe(&self, method: &Method) -> String {
        format!("{} on {}", method.method_type, method.subject)
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, method: &Method) -> Result<Execution>;

    /// Apply a recorded action to a replica's property store.
    fn replay(&self, _properties: &dyn PropertyStore, _method: &Method) -> Result<()> {
        Ok(())
    }
}

/// Type tag to handler.
#[derive(Default, Clone)]
pub struct MethodRegistry {
    handlers: HashMap<MethodType, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the property, audit and access-request methods.
    pub fn with_core(catalog: Arc<PropertyCatalog>) -> Self {
        use crate::audit::AuditReadHandler;
        use crate::property::{
            AccessRequestHandler, MapModifyHandler, PropertyGetHandler, SetModifyHandler,
            ValueReplaceHandler,
        };

        let mut registry = Self::new();
        let core: [Arc<dyn MethodHandler>; 6] = [
            Arc::new(ValueReplaceHandler::new(catalog.clone())),
            Arc::new(SetModifyHandler::new(catalog.clone())),
            Arc::new(MapModifyHandler::new(catalog.clone())),
            Arc::new(PropertyGetHandler::new(catalog.clone())),
            Arc::new(AccessRequestHandler::new(catalog)),
            Arc::new(AuditReadHandler),
        ];
        for handler in core {
            registry.handlers.insert(handler.method_type(), handler);
        }
        registry
    }

    /// Add a handler. A type tag can only be registered once.
    pub fn register(&mut self, handler: Arc<dyn MethodHandler>) -> Result<()> {
        let method_type = handler.method_type();
        if self.handlers.contains_key(&method_type) {
            return Err(FederationError::MalformedMethod(format!(
                "method type {method_type} already registered"
            )));
        }
        log::debug!("registered method type {method_type}");
        self.handlers.insert(method_type, handler);
        Ok(())
    }

    pub fn get(&self, method_type: &MethodType) -> Result<Arc<dyn MethodHandler>> {
        self.handlers
            .get(method_type)
            .cloned()
            .ok_or_else(|| FederationError::UnknownType(method_type.to_string()))
    }

    pub fn contains(&self, method_type: &MethodType) -> bool {
        self.handlers.contains_key(method_type)
    }

    /// Registered type tags, sorted.
    pub fn types(&self) -> Vec<MethodType> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}
