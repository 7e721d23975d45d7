//! Cross-host access requests.
//!
//! An identity asks an identity on another host for permissions. The
//! request travels as an external action presented with the requesting
//! host's credential, and lands as one entry of the target's
//! `access.requests` map, keyed by the requester.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{CredentialKind, Permissions, Requirements, SubjectBinding};
use crate::error::{AuthorizationError, FederationError, Result};
use crate::identity::{Entity, InternalIdentifier};
use crate::method::{
    create_method, Execution, ExecutionContext, Method, MethodHandler, MethodKind, MethodScope,
    MethodType,
};

use super::catalog::{PropertyCatalog, PropertyFlavor};
use super::store::{apply_change, PropertyChange, PropertySlot, PropertyStore, PropertyTableId};

pub const ACCESS_REQUEST: &str = "access.request";
pub const ACCESS_REQUESTS_TABLE: &str = "access.requests";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessRequest {
    pub requester: InternalIdentifier,
    pub permissions: Permissions,
    pub note: Option<String>,
}

/// Ask `target` for permissions on behalf of `entity`.
pub fn request_access(
    entity: &Entity,
    target: &InternalIdentifier,
    permissions: Permissions,
    note: Option<String>,
) -> Result<Method> {
    let request = AccessRequest {
        requester: entity.identity().address.clone(),
        permissions,
        note,
    };
    create_method(
        MethodKind::Action,
        MethodScope::External,
        MethodType::new(ACCESS_REQUEST),
        Some(entity),
        target.clone(),
        target.host(),
        serde_json::to_vec(&request)
            .map_err(|e| FederationError::SerializationError(e.to_string()))?,
    )
}

pub struct AccessRequestHandler {
    catalog: Arc<PropertyCatalog>,
}

impl AccessRequestHandler {
    pub fn new(catalog: Arc<PropertyCatalog>) -> Self {
        Self { catalog }
    }

    fn change(&self, method: &Method) -> Result<(AccessRequest, PropertyChange)> {
        let request: AccessRequest = method.payload_as()?;
        let table = PropertyTableId::new(ACCESS_REQUESTS_TABLE);
        self.catalog
            .expect(&table, PropertyFlavor::Map)
            .map_err(|e| FederationError::Decoding(e.to_string()))?;
        let entry = json!({
            "permissions": request.permissions,
            "note": request.note,
            "requested_at": method.created_at,
        });
        let change = PropertyChange {
            slot: PropertySlot::element(
                table,
                method.subject.clone(),
                request.requester.as_str().to_string(),
            ),
            old: None,
            new: Some(entry),
        };
        Ok((request, change))
    }
}

impl MethodHandler for AccessRequestHandler {
    fn method_type(&self) -> MethodType {
        MethodType::new(ACCESS_REQUEST)
    }

    fn kind(&self) -> MethodKind {
        MethodKind::Action
    }

    fn validate(&self, method: &Method) -> Result<()> {
        let (request, _) = self.change(method)?;
        if let Some(entity) = &method.entity {
            if entity.identity != request.requester {
                return Err(FederationError::Decoding(format!(
                    "request by {} sent from {}",
                    request.requester, entity.identity
                )));
            }
        }
        Ok(())
    }

    fn requirements(&self, _method: &Method) -> Result<Requirements> {
        Ok(Requirements::none())
    }

    /// Requests arrive from the requester's host, never from a client.
    fn subject_binding(&self) -> SubjectBinding {
        SubjectBinding::Host
    }

    fn audit_requirements(&self, _method: &Method) -> Result<Requirements> {
        Ok(self
            .catalog
            .get(&PropertyTableId::new(ACCESS_REQUESTS_TABLE))?
            .read_requirements())
    }

    fn describe(&self, method: &Method) -> String {
        match method.payload_as::<AccessRequest>() {
            Ok(request) => format!("access request from {}", request.requester),
            Err(_) => "access request".to_string(),
        }
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, method: &Method) -> Result<Execution> {
        let (request, change) = self.change(method)?;
        let credential = ctx
            .credential
            .ok_or(AuthorizationError::MissingCredential)?;
        match &credential.kind {
            CredentialKind::Host { host } if *host == request.requester.host() => {}
            _ => {
                return Err(AuthorizationError::InsufficientRestrictions(format!(
                    "access requests for {} must be presented by {}",
                    request.requester,
                    request.requester.host()
                ))
                .into())
            }
        }
        apply_change(ctx.properties, &change)?;
        log::info!(
            "{} requested access to {} on {}",
            request.requester,
            method.subject,
            ctx.host
        );
        Ok(Execution::reply(&json!({ "queued": true }))?.with_change(change))
    }

    fn replay(&self, properties: &dyn PropertyStore, method: &Method) -> Result<()> {
        apply_change(properties, &self.change(method)?.1)
    }
}
