//! Error types for AgenticFederation.
//!
//! All errors are strongly typed and propagated without panicking.
//! Private key material and decrypted plaintexts are never included
//! in error messages.

use serde::{Deserialize, Serialize};

/// Why an authorization check denied a method.
///
/// The variants are reported in the order the checks run; the first
/// failing check wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AuthorizationError {
    #[error("credential expired or its agent has been revoked")]
    RevokedCredential,

    #[error("insufficient permissions: missing {0}")]
    InsufficientPermissions(String),

    #[error("insufficient restrictions: {0}")]
    InsufficientRestrictions(String),

    #[error("wrong agent: method requires {required}, credential holds {actual}")]
    WrongAgent { required: String, actual: String },

    #[error("credential {credential} does not act for {subject}")]
    WrongSubject { subject: String, credential: String },

    #[error("no credential presented")]
    MissingCredential,
}

/// Federation error types covering all synchronous operations.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Malformed method: {0}")]
    MalformedMethod(String),

    #[error("Decoding failed: {0}")]
    Decoding(String),

    #[error("Unknown method type: {0}")]
    UnknownType(String),

    #[error("Authorization denied: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Verifiable encryption mismatch: {0}")]
    VerifiableEncryptionMismatch(String),

    #[error("Action already recorded: {0}")]
    Replay(String),

    #[error("Property conflict: {0}")]
    Conflict(String),

    #[error("Out of order audit entry: expected {expected}, got {actual}")]
    OutOfOrder { expected: u64, actual: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Audit append failed: {0}")]
    AuditAppend(String),

    #[error("Remote host rejected method: {0}")]
    Remote(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, FederationError>;
