//! Authenticated encryption with ChaCha20-Poly1305 and X25519 sealed boxes.
//!
//! A sealed box encrypts a value to a verifier's static X25519 key using a
//! fresh ephemeral key; only the verifier can open it.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};
use x25519_dalek::PublicKey as X25519PublicKey;
use zeroize::Zeroize;

use crate::crypto::derivation::{derive_key, sealed_value_context};
use crate::crypto::keys::{ephemeral_x25519, X25519KeyPair};
use crate::crypto::random::random_nonce_12;
use crate::error::{FederationError, Result};

/// Encrypt plaintext with ChaCha20-Poly1305. Returns `(nonce, ciphertext)`.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let nonce_bytes = random_nonce_12();
    let nonce = Nonce::from_slice(&nonce_bytes);
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| FederationError::EncryptionFailed(format!("cipher init: {e}")))?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| FederationError::EncryptionFailed(format!("encrypt: {e}")))?;
    Ok((nonce_bytes.to_vec(), ciphertext))
}

/// Decrypt ciphertext with ChaCha20-Poly1305.
pub fn decrypt(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != 12 {
        return Err(FederationError::DecryptionFailed(
            "nonce must be 12 bytes".into(),
        ));
    }
    let nonce = Nonce::from_slice(nonce);
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| FederationError::DecryptionFailed(format!("cipher init: {e}")))?;
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| FederationError::DecryptionFailed("authentication tag mismatch".into()))
}

/// A value encrypted to one verifier's X25519 key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    /// Sender's ephemeral X25519 public key.
    pub ephemeral_public: [u8; 32],
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Seal `plaintext` to `recipient` under the derivation `label`.
pub fn seal(recipient: &X25519PublicKey, label: &str, plaintext: &[u8]) -> Result<SealedBox> {
    let (secret, ephemeral_public) = ephemeral_x25519();
    let mut shared = *secret.diffie_hellman(recipient).as_bytes();
    let mut key = derive_key(&shared, &sealed_value_context(label))?;
    shared.zeroize();
    let sealed = encrypt(&key, plaintext);
    key.zeroize();
    let (nonce, ciphertext) = sealed?;
    Ok(SealedBox {
        ephemeral_public: *ephemeral_public.as_bytes(),
        nonce,
        ciphertext,
    })
}

/// Open a sealed box with the verifier's static key.
pub fn open(verifier: &X25519KeyPair, label: &str, sealed: &SealedBox) -> Result<Vec<u8>> {
    let ephemeral = X25519PublicKey::from(sealed.ephemeral_public);
    let mut shared = verifier.diffie_hellman(&ephemeral);
    let mut key = derive_key(&shared, &sealed_value_context(label))?;
    shared.zeroize();
    let opened = decrypt(&key, &sealed.nonce, &sealed.ciphertext);
    key.zeroize();
    opened
}
