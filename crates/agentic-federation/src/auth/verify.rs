//! Credential verification: is this credential genuine?
//!
//! Verification checks:
//! 1. The issuer key is the one the keyring holds for the issuer host
//! 2. The issuer signature covers the credential's fields
//! 3. Host credentials are issued by the host they name
//! 4. Anonymous credentials carry a verifiable-encryption proof that
//!    opens under this verifier's key and matches the commitment element

use crate::crypto::keys::X25519KeyPair;
use crate::error::{FederationError, Result};
use crate::identity::HostKeyring;

use super::credential::{Credential, CredentialKind};

/// Verifies credentials on behalf of one party.
pub struct CredentialVerifier<'a> {
    keyring: &'a HostKeyring,
    encryption: Option<&'a X25519KeyPair>,
}

impl<'a> CredentialVerifier<'a> {
    /// A verifier that can check signatures but not anonymous proofs.
    pub fn new(keyring: &'a HostKeyring) -> Self {
        Self {
            keyring,
            encryption: None,
        }
    }

    /// Also open verifiable-encryption proofs sealed to `keys`.
    pub fn with_encryption_keys(mut self, keys: &'a X25519KeyPair) -> Self {
        self.encryption = Some(keys);
        self
    }

    pub fn verify(&self, credential: &Credential) -> Result<()> {
        if !self
            .keyring
            .is_host_key(&credential.issuer, &credential.issuer_key)
        {
            log::warn!(
                "credential {} signed with a key {} never published",
                credential.id,
                credential.issuer
            );
            return Err(FederationError::SignatureInvalid);
        }
        credential.verify_signature()?;

        if let CredentialKind::Host { host } = &credential.kind {
            if host != &credential.issuer {
                return Err(FederationError::SignatureInvalid);
            }
        }

        match &credential.proof {
            Some(proof) => {
                let keys = self.encryption.ok_or_else(|| {
                    FederationError::VerifiableEncryptionMismatch(
                        "verifier has no encryption key".into(),
                    )
                })?;
                proof.verify(credential.commitment.as_deref(), keys)?;
            }
            None if credential.is_anonymous() => {
                return Err(FederationError::VerifiableEncryptionMismatch(
                    "anonymous credential carries no proof".into(),
                ));
            }
            None => {}
        }
        Ok(())
    }
}
