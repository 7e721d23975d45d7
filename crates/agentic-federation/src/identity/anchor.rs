//! Host anchor: a host's key material and its public document.
//!
//! Each host owns an Ed25519 signing key (replies, credentials, host-to-host
//! methods) and an X25519 key that clients seal verifiable-encryption values
//! to. The public halves are published in a self-signed `HostDocument`;
//! peers collect documents in a `HostKeyring`.

use std::collections::HashMap;
use std::sync::RwLock;

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use x25519_dalek::PublicKey as X25519PublicKey;

use crate::crypto::keys::{Ed25519KeyPair, X25519KeyPair};
use crate::crypto::signing;
use crate::error::{FederationError, Result};

use super::identifier::HostIdentifier;

/// The root key material of a host.
pub struct HostAnchor {
    identifier: HostIdentifier,
    signing: Ed25519KeyPair,
    encryption: X25519KeyPair,
    pub created_at: u64,
}

impl HostAnchor {
    /// Create a new host anchor with fresh keys.
    pub fn new(identifier: HostIdentifier) -> Self {
        Self {
            identifier,
            signing: Ed25519KeyPair::generate(),
            encryption: X25519KeyPair::generate(),
            created_at: crate::time::now_micros(),
        }
    }

    pub fn identifier(&self) -> &HostIdentifier {
        &self.identifier
    }

    pub fn signing_key(&self) -> &SigningKey {
        self.signing.signing_key()
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing.verifying_key()
    }

    pub fn public_key_base64(&self) -> String {
        signing::public_key_to_base64(self.signing.verifying_key())
    }

    /// The X25519 key pair sealed values are opened with.
    pub fn encryption_keys(&self) -> &X25519KeyPair {
        &self.encryption
    }

    /// Generate the public, self-signed host document.
    pub fn to_document(&self) -> HostDocument {
        let mut doc = HostDocument {
            host: self.identifier.clone(),
            public_key: self.public_key_base64(),
            encryption_key: self.encryption.public_key_bytes(),
            created_at: self.created_at,
            signature: String::new(),
        };
        doc.signature = signing::sign_to_base64(self.signing_key(), doc.sign_payload().as_bytes());
        doc
    }
}

/// Public host document (shareable, no private keys).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDocument {
    pub host: HostIdentifier,
    pub public_key: String,
    pub encryption_key: [u8; 32],
    pub created_at: u64,
    pub signature: String,
}

impl HostDocument {
    fn sign_payload(&self) -> String {
        format!(
            "host-document:{}:{}:{}:{}",
            self.host,
            self.public_key,
            hex::encode(self.encryption_key),
            self.created_at
        )
    }

    /// Verify the self-signature on this document.
    pub fn verify_signature(&self) -> Result<()> {
        signing::verify_with_key_base64(
            &self.public_key,
            self.sign_payload().as_bytes(),
            &self.signature,
        )
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        signing::public_key_from_base64(&self.public_key)
    }

    pub fn encryption_public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(self.encryption_key)
    }
}

/// The set of host documents a party trusts.
#[derive(Default)]
pub struct HostKeyring {
    documents: RwLock<HashMap<HostIdentifier, HostDocument>>,
}

impl HostKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a host document after checking its self-signature.
    pub fn insert(&self, doc: HostDocument) -> Result<()> {
        doc.verify_signature()?;
        self.documents
            .write()
            .map_err(|_| FederationError::StorageError("keyring lock poisoned".into()))?
            .insert(doc.host.clone(), doc);
        Ok(())
    }

    /// Look up the document of a host.
    pub fn get(&self, host: &HostIdentifier) -> Result<HostDocument> {
        self.documents
            .read()
            .map_err(|_| FederationError::StorageError("keyring lock poisoned".into()))?
            .get(host)
            .cloned()
            .ok_or_else(|| FederationError::UnknownRecipient(host.to_string()))
    }

    /// Whether `key_b64` is the published signing key of `host`.
    pub fn is_host_key(&self, host: &HostIdentifier, key_b64: &str) -> bool {
        self.get(host).is_ok_and(|doc| doc.public_key == key_b64)
    }
}
