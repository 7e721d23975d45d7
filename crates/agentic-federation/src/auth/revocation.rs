//! Revocation: withdrawing an agent's rights.
//!
//! A revocation record is signed by the host holding the agent's identity.
//! Revoking an agent also revokes every agent delegated from it, because
//! credentials carry their agent lineage.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::crypto::signing;
use crate::error::{FederationError, Result};
use crate::identity::{AgentId, HostAnchor, HostIdentifier};

/// A signed revocation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub agent: AgentId,
    pub revoker: HostIdentifier,
    pub revoker_key: String,
    pub revoked_at: u64,
    pub reason: RevocationReason,
    pub signature: String,
}

impl Revocation {
    /// Create and sign a revocation with the host's key.
    pub fn create(agent: AgentId, reason: RevocationReason, host: &HostAnchor) -> Self {
        let revoked_at = crate::time::now_micros();
        let revoker = host.identifier().clone();
        let to_sign = sign_payload(&agent, &revoker, revoked_at, &reason);
        Self {
            agent,
            revoker,
            revoker_key: host.public_key_base64(),
            revoked_at,
            reason,
            signature: signing::sign_to_base64(host.signing_key(), to_sign.as_bytes()),
        }
    }

    /// Verify the revocation signature.
    pub fn verify_signature(&self) -> Result<()> {
        let to_verify = sign_payload(&self.agent, &self.revoker, self.revoked_at, &self.reason);
        signing::verify_with_key_base64(&self.revoker_key, to_verify.as_bytes(), &self.signature)
    }
}

fn sign_payload(
    agent: &AgentId,
    revoker: &HostIdentifier,
    revoked_at: u64,
    reason: &RevocationReason,
) -> String {
    format!("revoke:{}:{revoker}:{revoked_at}:{}", agent.0, reason.as_str())
}

/// Reason for revocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RevocationReason {
    /// The agent's key or device has been compromised.
    Compromised,
    /// The identity removed the agent.
    Removed,
    /// The agent was replaced by a refined one.
    Superseded,
    Custom(String),
}

impl RevocationReason {
    /// Return a stable string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Compromised => "compromised",
            Self::Removed => "removed",
            Self::Superseded => "superseded",
            Self::Custom(s) => s.as_str(),
        }
    }
}

/// Revocations known to one party.
#[derive(Default)]
pub struct RevocationList {
    revoked: RwLock<HashMap<AgentId, Revocation>>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a revocation after checking its signature.
    pub fn revoke(&self, revocation: Revocation) -> Result<()> {
        revocation.verify_signature()?;
        log::info!(
            "agent {} revoked by {} ({})",
            revocation.agent,
            revocation.revoker,
            revocation.reason.as_str()
        );
        self.revoked
            .write()
            .map_err(|_| FederationError::StorageError("revocation lock poisoned".into()))?
            .insert(revocation.agent.clone(), revocation);
        Ok(())
    }

    pub fn is_revoked(&self, agent: &AgentId) -> bool {
        self.revoked
            .read()
            .map(|r| r.contains_key(agent))
            .unwrap_or(true)
    }

    /// Whether the agent or any of its ancestors is revoked.
    pub fn is_any_revoked<'a>(&self, agents: impl IntoIterator<Item = &'a AgentId>) -> bool {
        agents.into_iter().any(|a| self.is_revoked(a))
    }
}
