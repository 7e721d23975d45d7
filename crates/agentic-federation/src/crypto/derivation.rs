//! Key derivation using HKDF-SHA256.
//!
//! Sealed boxes never use a Diffie-Hellman output directly; the shared
//! secret is expanded with a context string naming what the box holds.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{FederationError, Result};

/// Derive a 32-byte key from input key material and a context string.
pub fn derive_key(ikm: &[u8; 32], context: &str) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, ikm);
    let mut output = [0u8; 32];
    hk.expand(context.as_bytes(), &mut output)
        .map_err(|e| FederationError::DerivationFailed(format!("HKDF expand failed: {e}")))?;
    Ok(output)
}

/// Derivation context for a sealed verifiable-encryption value.
pub fn sealed_value_context(label: &str) -> String {
    format!("agentic-federation/verifiable/{label}")
}
