//! Entities: the context a method executes against.
//!
//! An `Account` lives on a host and is bound to one identity held there.
//! A `Role` lives on a client and views an identity through an agent.
//! Both only reference their identity; its lifecycle belongs to the
//! resolver that produced it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::agent::Agent;
use super::identifier::{HostIdentifier, InternalIdentifier};

/// A resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub address: InternalIdentifier,
    pub created_at: u64,
    /// Commitment elements of anonymous credentials that act for this identity.
    #[serde(default)]
    pub anonymous_commitments: BTreeSet<String>,
}

impl Identity {
    pub fn new(address: InternalIdentifier) -> Self {
        Self {
            address,
            created_at: crate::time::now_micros(),
            anonymous_commitments: BTreeSet::new(),
        }
    }

    pub fn host(&self) -> HostIdentifier {
        self.address.host()
    }
}

/// Stable address of an entity: the identity and the host it is held on.
///
/// This is what travels inside methods and keys the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub host: HostIdentifier,
    pub identity: InternalIdentifier,
}

impl EntityKey {
    /// The account key of `identity` on its own host.
    pub fn account(identity: &InternalIdentifier) -> Self {
        Self {
            host: identity.host(),
            identity: identity.clone(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.identity, self.host)
    }
}

/// Host-side entity.
#[derive(Debug, Clone)]
pub struct Account {
    pub host: HostIdentifier,
    pub identity: Arc<Identity>,
}

/// Client-side entity.
#[derive(Debug, Clone)]
pub struct Role {
    /// Name of the client holding the role.
    pub client: String,
    pub identity: Arc<Identity>,
    pub agent: Agent,
}

/// The context a method executes against.
#[derive(Debug, Clone)]
pub enum Entity {
    Account(Account),
    Role(Role),
}

impl Entity {
    pub fn identity(&self) -> &Identity {
        match self {
            Self::Account(a) => &a.identity,
            Self::Role(r) => &r.identity,
        }
    }

    /// The host the entity's identity lives on.
    pub fn host(&self) -> HostIdentifier {
        match self {
            Self::Account(a) => a.host.clone(),
            Self::Role(r) => r.identity.host(),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey {
            host: self.host(),
            identity: self.identity().address.clone(),
        }
    }

    /// The acting agent, for client-side entities.
    pub fn agent(&self) -> Option<&Agent> {
        match self {
            Self::Account(_) => None,
            Self::Role(r) => Some(&r.agent),
        }
    }
}
