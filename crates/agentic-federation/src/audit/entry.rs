//! Audit entries: one per executed action.

use serde::{Deserialize, Serialize};

use crate::auth::{CredentialId, Requirements};
use crate::error::Result;
use crate::identity::{AgentId, EntityKey, InternalIdentifier};
use crate::method::{self, ActionId, Method, MethodScope, MethodSignature, MethodType};

/// What was done, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub action: ActionId,
    pub method_type: MethodType,
    pub scope: MethodScope,
    pub subject: InternalIdentifier,
    pub summary: String,
}

/// An append-only record of one executed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// 1 for the first action on the entity, then strictly +1.
    pub sequence: u64,
    pub entity: EntityKey,
    pub descriptor: ActionDescriptor,
    /// Signature of the recorded method.
    pub signature: Option<MethodSignature>,
    pub credential: Option<CredentialId>,
    pub agent: Option<AgentId>,
    /// What a reader must hold to see this entry.
    pub requirements: Requirements,
    pub recorded_at: u64,
    /// The encoded method, for replay on replicas.
    pub method: Vec<u8>,
}

impl AuditEntry {
    pub fn record(
        sequence: u64,
        entity: EntityKey,
        method: &Method,
        summary: String,
        requirements: Requirements,
    ) -> Result<Self> {
        Ok(Self {
            sequence,
            entity,
            descriptor: ActionDescriptor {
                action: method.id.clone(),
                method_type: method.method_type.clone(),
                scope: method.scope,
                subject: method.subject.clone(),
                summary,
            },
            signature: method.signature.clone(),
            credential: method.credential.as_ref().map(|c| c.id.clone()),
            agent: method.credential.as_ref().map(|c| c.agent.clone()),
            requirements,
            recorded_at: crate::time::now_micros(),
            method: method::encode(method)?,
        })
    }

    pub fn action(&self) -> &ActionId {
        &self.descriptor.action
    }

    /// Decode the recorded method.
    pub fn method(&self) -> Result<Method> {
        method::decode_envelope(&self.method)
    }
}
