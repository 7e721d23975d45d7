//! Identifier resolution.
//!
//! Resolution turns a syntactically valid identifier into an identity and
//! may fail with `NotFound`. Resolved identities are long-lived, so the
//! caching wrapper resolves each identifier once.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{FederationError, Result};

use super::entity::Identity;
use super::identifier::InternalIdentifier;

/// Boundary to whatever knows which identities exist.
pub trait IdentifierResolver: Send + Sync {
    fn resolve(&self, id: &InternalIdentifier) -> Result<Arc<Identity>>;
}

/// In-memory directory of identities held by one or more hosts.
#[derive(Default)]
pub struct Directory {
    identities: RwLock<HashMap<InternalIdentifier, Arc<Identity>>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identity, returning the stored handle.
    ///
    /// Registering an existing identifier returns the existing identity.
    pub fn register(&self, address: InternalIdentifier) -> Result<Arc<Identity>> {
        let mut identities = self
            .identities
            .write()
            .map_err(|_| FederationError::StorageError("directory lock poisoned".into()))?;
        Ok(identities
            .entry(address.clone())
            .or_insert_with(|| Arc::new(Identity::new(address)))
            .clone())
    }

    /// Let anonymous credentials committed to `commitment` act for `address`.
    ///
    /// Handles resolved earlier keep the commitments they were resolved with.
    pub fn register_commitment(
        &self,
        address: &InternalIdentifier,
        commitment: String,
    ) -> Result<Arc<Identity>> {
        let mut identities = self
            .identities
            .write()
            .map_err(|_| FederationError::StorageError("directory lock poisoned".into()))?;
        let slot = identities
            .get_mut(address)
            .ok_or_else(|| FederationError::NotFound(format!("identity {address}")))?;
        let mut updated = Identity::clone(slot);
        updated.anonymous_commitments.insert(commitment);
        *slot = Arc::new(updated);
        Ok(slot.clone())
    }
}

impl IdentifierResolver for Directory {
    fn resolve(&self, id: &InternalIdentifier) -> Result<Arc<Identity>> {
        self.identities
            .read()
            .map_err(|_| FederationError::StorageError("directory lock poisoned".into()))?
            .get(id)
            .cloned()
            .ok_or_else(|| FederationError::NotFound(format!("identity {id}")))
    }
}

/// Resolve-once cache in front of another resolver.
///
/// Failures are not cached; a later registration becomes visible.
pub struct CachingResolver<R> {
    inner: R,
    cache: RwLock<HashMap<InternalIdentifier, Arc<Identity>>>,
}

impl<R: IdentifierResolver> CachingResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl<R: IdentifierResolver> IdentifierResolver for CachingResolver<R> {
    fn resolve(&self, id: &InternalIdentifier) -> Result<Arc<Identity>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(found) = cache.get(id) {
                return Ok(found.clone());
            }
        }
        let identity = self.inner.resolve(id)?;
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(id.clone(), identity.clone());
        }
        Ok(identity)
    }
}
