//! The `audit.read` query.

use serde::{Deserialize, Serialize};

use crate::auth::Requirements;
use crate::error::{AuthorizationError, FederationError, Result};
use crate::identity::{Entity, EntityKey};
use crate::method::{
    create_method, Execution, ExecutionContext, Method, MethodHandler, MethodKind, MethodScope,
    MethodType,
};

use super::entry::AuditEntry;

pub const AUDIT_READ: &str = "audit.read";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditRead {
    /// Return entries with a higher sequence number.
    pub since: u64,
    /// At most this many entries; the host's page limit when absent.
    pub limit: Option<usize>,
}

/// One answer to `audit.read`.
///
/// `entries` are the visible entries after `since`. Every sequence up to
/// `through` has been looked at, so a reader may skip the hidden ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPage {
    pub since: u64,
    pub through: u64,
    pub entries: Vec<AuditEntry>,
}

/// Read the audit log of the entity's own identity.
pub fn read_audit(entity: &Entity, since: u64, limit: Option<usize>) -> Result<Method> {
    let subject = entity.identity().address.clone();
    create_method(
        MethodKind::Query,
        MethodScope::Internal,
        MethodType::new(AUDIT_READ),
        Some(entity),
        subject.clone(),
        subject.host(),
        serde_json::to_vec(&AuditRead { since, limit })
            .map_err(|e| FederationError::SerializationError(e.to_string()))?,
    )
}

/// Serves audit entries the presenting credential may see.
pub struct AuditReadHandler;

impl MethodHandler for AuditReadHandler {
    fn method_type(&self) -> MethodType {
        MethodType::new(AUDIT_READ)
    }

    fn kind(&self) -> MethodKind {
        MethodKind::Query
    }

    fn validate(&self, method: &Method) -> Result<()> {
        method.payload_as::<AuditRead>().map(|_| ())
    }

    /// Visibility is decided per entry, so the query itself needs nothing.
    fn requirements(&self, _method: &Method) -> Result<Requirements> {
        Ok(Requirements::none())
    }

    fn execute(&self, ctx: &ExecutionContext<'_>, method: &Method) -> Result<Execution> {
        let read: AuditRead = method.payload_as()?;
        let viewer = ctx
            .credential
            .ok_or(AuthorizationError::MissingCredential)?;
        let limit = read
            .limit
            .unwrap_or(ctx.audit.page_limit())
            .min(ctx.audit.page_limit());
        let entity = EntityKey::account(&method.subject);
        let mut visible = ctx
            .audit
            .read_entries(&entity, read.since, viewer, ctx.authorizer);
        let entries = visible
            .by_ref()
            .take(limit)
            .collect::<Result<Vec<AuditEntry>>>()?;
        let page = AuditPage {
            since: read.since,
            through: visible.examined(),
            entries,
        };
        log::debug!(
            "{} audit entries of {entity} up to #{} served to {}",
            page.entries.len(),
            page.through,
            viewer.agent
        );
        Execution::reply(&page)
    }
}
