//! Cryptographic plumbing for AgenticFederation.
//!
//! The primitives themselves come from the dalek and RustCrypto crates;
//! this module only frames them for the protocol:
//! - Ed25519 signing of methods, replies and credentials
//! - X25519 sealed boxes for verifiable encryption
//! - HKDF-SHA256 key derivation for sealed boxes
//! - ChaCha20-Poly1305 authenticated encryption
//! - Cryptographically secure random values

pub mod derivation;
pub mod encryption;
pub mod keys;
pub mod random;
pub mod signing;
