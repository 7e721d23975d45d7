//! Verifiable encryption for anonymous credentials.
//!
//! An anonymous credential is committed to two secret values, a serial and
//! a blinding value. The issuer signs only the public commitment element.
//! When presenting the credential, the client seals each value to the
//! verifier's X25519 key next to a per-value commitment. The verifier opens
//! the boxes and checks that the plaintexts match both the per-value
//! commitments and the signed element, learning nothing that links the
//! credential to an identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::PublicKey as X25519PublicKey;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::encryption::{open, seal, SealedBox};
use crate::crypto::keys::X25519KeyPair;
use crate::crypto::random::random_nonce_32;
use crate::error::{FederationError, Result};

const SERIAL: &str = "serial";
const BLINDING: &str = "blinding";

fn value_commitment(label: &str, value: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update(b":");
    hasher.update(value);
    hex::encode(hasher.finalize())
}

fn element_commitment(serial: &[u8], blinding: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"commitment:");
    hasher.update(serial);
    hasher.update(blinding);
    hex::encode(hasher.finalize())
}

/// The client-held secrets behind an anonymous credential.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AnonymousSecrets {
    serial: [u8; 32],
    blinding: [u8; 32],
}

impl AnonymousSecrets {
    pub fn generate() -> Self {
        Self {
            serial: random_nonce_32(),
            blinding: random_nonce_32(),
        }
    }

    /// Public commitment element the issuer signs.
    pub fn commitment(&self) -> String {
        element_commitment(&self.serial, &self.blinding)
    }

    /// Produce a full proof for one verifier.
    pub fn prove_to(&self, verifier: &X25519PublicKey) -> Result<AnonymousProof> {
        Ok(AnonymousProof {
            serial: Some(VerifiableEncryption::create(verifier, SERIAL, &self.serial)?),
            blinding: Some(VerifiableEncryption::create(verifier, BLINDING, &self.blinding)?),
        })
    }
}

/// One sealed value and its plaintext commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiableEncryption {
    pub sealed: SealedBox,
    pub commitment: String,
}

impl VerifiableEncryption {
    fn create(verifier: &X25519PublicKey, label: &str, value: &[u8]) -> Result<Self> {
        Ok(Self {
            sealed: seal(verifier, label, value)?,
            commitment: value_commitment(label, value),
        })
    }

    /// Open the box and check the plaintext against the commitment.
    fn open_checked(&self, verifier: &X25519KeyPair, label: &str) -> Result<Vec<u8>> {
        let value = open(verifier, label, &self.sealed).map_err(|_| {
            FederationError::VerifiableEncryptionMismatch(format!("{label} does not decrypt"))
        })?;
        if value_commitment(label, &value) != self.commitment {
            return Err(FederationError::VerifiableEncryptionMismatch(format!(
                "{label} does not match its commitment"
            )));
        }
        Ok(value)
    }
}

/// The per-verifier proof attached to an anonymous credential.
///
/// Either pair may be absent on the wire. A proof only counts against a
/// commitment element, and then both pairs are required; a lone pair
/// checks only the commitment it brings along and proves nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymousProof {
    pub serial: Option<VerifiableEncryption>,
    pub blinding: Option<VerifiableEncryption>,
}

impl AnonymousProof {
    /// Check the proof under the verifier's key.
    ///
    /// Each present pair must decrypt to its commitment. With an
    /// `element`, both pairs must be present and reproduce it.
    pub fn verify(&self, element: Option<&str>, verifier: &X25519KeyPair) -> Result<()> {
        let serial = self
            .serial
            .as_ref()
            .map(|ve| ve.open_checked(verifier, SERIAL))
            .transpose()?;
        let blinding = self
            .blinding
            .as_ref()
            .map(|ve| ve.open_checked(verifier, BLINDING))
            .transpose()?;

        let Some(element) = element else {
            return Ok(());
        };
        let (Some(mut serial), Some(mut blinding)) = (serial, blinding) else {
            return Err(FederationError::VerifiableEncryptionMismatch(
                "both pairs are needed to reproduce the commitment element".into(),
            ));
        };
        let matches = element_commitment(&serial, &blinding) == element;
        serial.zeroize();
        blinding.zeroize();
        if !matches {
            return Err(FederationError::VerifiableEncryptionMismatch(
                "values do not match the commitment element".into(),
            ));
        }
        Ok(())
    }
}
