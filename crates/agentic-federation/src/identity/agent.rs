//! Agents: capability holders acting for an identity.
//!
//! An agent holds a public key, a permission set and restrictions. Agents
//! may delegate to child agents; a child never holds more than its parent,
//! and refining an agent can only narrow it.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::{Permissions, Restrictions};

use super::identifier::InternalIdentifier;

/// Unique identifier for an agent.
///
/// Format: `aagent_` + base58 of first 16 bytes of SHA-256(identity, key, time).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A capability holder acting on behalf of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub identity: InternalIdentifier,
    /// The agent's Ed25519 public key (base64); it signs methods.
    pub key: String,
    /// Delegating agent, if any.
    pub parent: Option<AgentId>,
    /// Ancestor chain from the root agent down to `parent`.
    pub lineage: Vec<AgentId>,
    pub permissions: Permissions,
    pub restrictions: Restrictions,
    pub created_at: u64,
    pub revoked_at: Option<u64>,
}

impl Agent {
    /// Create a root agent for an identity.
    pub fn new(
        identity: InternalIdentifier,
        key: String,
        permissions: Permissions,
        restrictions: Restrictions,
    ) -> Self {
        let now = crate::time::now_micros();
        Self {
            id: agent_id(&identity, &key, now),
            identity,
            key,
            parent: None,
            lineage: Vec::new(),
            permissions,
            restrictions,
            created_at: now,
            revoked_at: None,
        }
    }

    /// Create a child agent holding at most what this agent holds.
    pub fn delegate(
        &self,
        key: String,
        permissions: &Permissions,
        restrictions: &Restrictions,
    ) -> Agent {
        let now = crate::time::now_micros();
        let mut lineage = self.lineage.clone();
        lineage.push(self.id.clone());
        Agent {
            id: agent_id(&self.identity, &key, now),
            identity: self.identity.clone(),
            key,
            parent: Some(self.id.clone()),
            lineage,
            permissions: permissions.restrict_to(&self.permissions),
            restrictions: restrictions.restrict_to(&self.restrictions),
            created_at: now,
            revoked_at: None,
        }
    }

    /// Narrow this agent's permissions and restrictions in place.
    pub fn refine(&mut self, permissions: &Permissions, restrictions: &Restrictions) {
        self.permissions = self.permissions.restrict_to(permissions);
        self.restrictions = self.restrictions.restrict_to(restrictions);
    }

    /// Whether `other` is this agent or one of its ancestors.
    pub fn is_covered_by(&self, other: &AgentId) -> bool {
        &self.id == other || self.lineage.contains(other)
    }

    pub fn revoke(&mut self) {
        if self.revoked_at.is_none() {
            self.revoked_at = Some(crate::time::now_micros());
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

fn agent_id(identity: &InternalIdentifier, key: &str, now: u64) -> AgentId {
    let nonce = crate::crypto::random::random_nonce_32();
    let input = format!("agent:{identity}:{key}:{now}:{}", hex::encode(nonce));
    let hash = Sha256::digest(input.as_bytes());
    AgentId(format!("aagent_{}", bs58::encode(&hash[..16]).into_string()))
}
