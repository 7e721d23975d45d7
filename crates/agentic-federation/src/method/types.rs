//! The method envelope: one flat value for every kind of operation.
//!
//! A method is tagged along two independent axes:
//! - `MethodKind`: a `Query` reads, an `Action` mutates and is audited
//! - `MethodScope`: `Internal` executes on the host of the acting entity,
//!   `External` crosses to another host through push delivery
//!
//! Service-specific behaviour lives behind the `MethodHandler` selected by
//! the type tag, not in the envelope.

use std::fmt;

use ed25519_dalek::SigningKey;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::Credential;
use crate::crypto::signing;
use crate::error::{FederationError, Result};
use crate::identity::{Entity, EntityKey, HostIdentifier, InternalIdentifier};

/// Unique identifier of one method instance; the replay-detection key.
///
/// Format: `aact_` + base58 of first 16 bytes of SHA-256(nonce, time).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub String);

impl ActionId {
    pub fn generate() -> Self {
        let nonce = crate::crypto::random::random_nonce_32();
        let input = format!("action:{}:{}", hex::encode(nonce), crate::time::now_micros());
        let hash = Sha256::digest(input.as_bytes());
        Self(format!("aact_{}", bs58::encode(&hash[..16]).into_string()))
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type tag selecting the handler of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodType(pub String);

impl MethodType {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodKind {
    Query,
    Action,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodScope {
    Internal,
    External,
}

/// Signature over a method by the key of its presented credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub signer_key: String,
    pub signed_at: u64,
    pub digest: String,
    pub signature: String,
}

/// A typed, optionally signed unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub id: ActionId,
    pub kind: MethodKind,
    pub scope: MethodScope,
    pub method_type: MethodType,
    /// Acting entity; only its key travels, the recipient resolves it.
    pub entity: Option<EntityKey>,
    pub subject: InternalIdentifier,
    pub recipient: HostIdentifier,
    pub created_at: u64,
    /// Handler-specific content (JSON).
    pub payload: Vec<u8>,
    pub credential: Option<Credential>,
    pub signature: Option<MethodSignature>,
}

/// Build a method, enforcing the envelope invariants.
pub fn create_method(
    kind: MethodKind,
    scope: MethodScope,
    method_type: MethodType,
    entity: Option<&Entity>,
    subject: InternalIdentifier,
    recipient: HostIdentifier,
    payload: Vec<u8>,
) -> Result<Method> {
    let method = Method {
        id: ActionId::generate(),
        kind,
        scope,
        method_type,
        entity: entity.map(Entity::key),
        subject,
        recipient,
        created_at: crate::time::now_micros(),
        payload,
        credential: None,
        signature: None,
    };
    method.check_invariants()?;
    Ok(method)
}

impl Method {
    /// Check the Internal/External invariants.
    pub fn check_invariants(&self) -> Result<()> {
        let subject_host = self.subject.host();
        if self.recipient != subject_host {
            return Err(FederationError::MalformedMethod(format!(
                "recipient {} is not the host of subject {}",
                self.recipient, self.subject
            )));
        }
        if self.scope == MethodScope::Internal {
            let entity = self.entity.as_ref().ok_or_else(|| {
                FederationError::MalformedMethod("internal method without entity".into())
            })?;
            if entity.host != subject_host {
                return Err(FederationError::MalformedMethod(format!(
                    "internal method for {} issued by entity on {}",
                    self.subject, entity.host
                )));
            }
        }
        Ok(())
    }

    pub fn is_action(&self) -> bool {
        self.kind == MethodKind::Action
    }

    pub fn is_query(&self) -> bool {
        self.kind == MethodKind::Query
    }

    /// Decode the JSON payload.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.payload).map_err(|e| {
            FederationError::Decoding(format!("{} payload: {e}", self.method_type))
        })
    }

    /// Present a credential with this method. Clears any signature.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self.signature = None;
        self
    }

    /// Digest over every field but the signature.
    pub fn signing_digest(&self) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        let bytes = bincode::serialize(&unsigned)
            .map_err(|e| FederationError::SerializationError(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Sign the method. The signature binds the action identifier, so
    /// re-delivery of the same signed method is detectable as a replay.
    pub fn sign(mut self, key: &SigningKey) -> Result<Self> {
        let digest = self.signing_digest()?;
        self.signature = Some(MethodSignature {
            signer_key: signing::public_key_to_base64(&key.verifying_key()),
            signed_at: crate::time::now_micros(),
            signature: signing::sign_to_base64(key, digest.as_bytes()),
            digest,
        });
        Ok(self)
    }

    /// Verify the signature, returning it.
    pub fn verify_signature(&self) -> Result<&MethodSignature> {
        let sig = self
            .signature
            .as_ref()
            .ok_or(FederationError::SignatureInvalid)?;
        if self.signing_digest()? != sig.digest {
            return Err(FederationError::SignatureInvalid);
        }
        signing::verify_with_key_base64(&sig.signer_key, sig.digest.as_bytes(), &sig.signature)?;
        Ok(sig)
    }
}
