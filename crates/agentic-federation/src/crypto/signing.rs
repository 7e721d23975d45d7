//! Ed25519 signing and verification.
//!
//! Everything that crosses a host boundary carries its signer's public
//! key and signature as base64 strings; the helpers here convert between
//! those strings and dalek types.

use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::crypto::keys::Ed25519KeyPair;
use crate::error::{FederationError, Result};

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// Sign a message with an Ed25519 signing key.
pub fn sign(signing_key: &SigningKey, message: &[u8]) -> Signature {
    signing_key.sign(message)
}

/// Verify an Ed25519 signature against a public key and message.
pub fn verify(verifying_key: &VerifyingKey, message: &[u8], signature: &Signature) -> Result<()> {
    verifying_key
        .verify(message, signature)
        .map_err(|_| FederationError::SignatureInvalid)
}

/// Sign a message and return the signature as a base64-encoded string.
pub fn sign_to_base64(signing_key: &SigningKey, message: &[u8]) -> String {
    b64().encode(sign(signing_key, message).to_bytes())
}

/// Encode a verifying key for transport.
pub fn public_key_to_base64(key: &VerifyingKey) -> String {
    b64().encode(key.to_bytes())
}

/// Decode a base64 verifying key.
pub fn public_key_from_base64(key_b64: &str) -> Result<VerifyingKey> {
    let bytes = b64()
        .decode(key_b64)
        .map_err(|e| FederationError::InvalidKey(format!("invalid base64 key: {e}")))?;
    let key_bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| FederationError::InvalidKey("public key must be 32 bytes".into()))?;
    Ed25519KeyPair::verifying_key_from_bytes(&key_bytes)
}

/// Verify a base64-encoded signature.
pub fn verify_from_base64(
    verifying_key: &VerifyingKey,
    message: &[u8],
    signature_b64: &str,
) -> Result<()> {
    let sig_bytes = b64()
        .decode(signature_b64)
        .map_err(|_| FederationError::SignatureInvalid)?;
    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| FederationError::SignatureInvalid)?;
    verify(verifying_key, message, &Signature::from_bytes(&sig_array))
}

/// Verify a base64 signature against a base64 public key.
///
/// A key that does not decode is reported as an invalid signature: the
/// caller cannot distinguish a forged key from a forged signature.
pub fn verify_with_key_base64(key_b64: &str, message: &[u8], signature_b64: &str) -> Result<()> {
    let key = public_key_from_base64(key_b64).map_err(|_| FederationError::SignatureInvalid)?;
    verify_from_base64(&key, message, signature_b64)
}
