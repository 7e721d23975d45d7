//! Secure random number generation.

use rand::RngCore;

/// Generate a fixed-size array of cryptographically secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    rand::thread_rng().fill_bytes(&mut buf);
    buf
}

/// Generate a random 32-byte value (action nonces, credential serials).
pub fn random_nonce_32() -> [u8; 32] {
    random_bytes()
}

/// Generate a random 12-byte nonce (for ChaCha20-Poly1305).
pub fn random_nonce_12() -> [u8; 12] {
    random_bytes()
}
