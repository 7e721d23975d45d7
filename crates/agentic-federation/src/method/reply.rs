//! Replies: the signed answer of the executing host.
//!
//! Every method is answered with exactly one reply. The reply carries the
//! frame number of the request it answers and the action identifier, so a
//! caller can correlate it without trusting transport ordering.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::signing;
use crate::error::{AuthorizationError, FederationError, Result};
use crate::identity::{HostAnchor, HostIdentifier, HostKeyring};

use super::types::ActionId;

/// Category of a remote failure, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    Malformed,
    Decoding,
    UnknownType,
    Authorization(AuthorizationError),
    InvalidSignature,
    Replay,
    Conflict,
    UnknownRecipient,
    NotFound,
    /// The host could not take the method now; retrying may succeed.
    Busy,
    Internal,
}

/// A failure reported by the executing host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn from_error(err: &FederationError) -> Self {
        let kind = match err {
            FederationError::MalformedMethod(_) | FederationError::InvalidIdentifier(_) => {
                RemoteErrorKind::Malformed
            }
            FederationError::Decoding(_) => RemoteErrorKind::Decoding,
            FederationError::UnknownType(_) => RemoteErrorKind::UnknownType,
            FederationError::Authorization(a) => RemoteErrorKind::Authorization(a.clone()),
            FederationError::SignatureInvalid
            | FederationError::VerifiableEncryptionMismatch(_) => RemoteErrorKind::InvalidSignature,
            FederationError::Replay(_) => RemoteErrorKind::Replay,
            FederationError::Conflict(_) => RemoteErrorKind::Conflict,
            FederationError::UnknownRecipient(_) => RemoteErrorKind::UnknownRecipient,
            FederationError::NotFound(_) => RemoteErrorKind::NotFound,
            FederationError::AuditAppend(_)
            | FederationError::StorageError(_)
            | FederationError::Io(_) => RemoteErrorKind::Busy,
            _ => RemoteErrorKind::Internal,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == RemoteErrorKind::Busy
    }

    /// Surface the failure to a local caller.
    pub fn into_error(self) -> FederationError {
        match self.kind {
            RemoteErrorKind::Malformed => FederationError::MalformedMethod(self.message),
            RemoteErrorKind::Decoding => FederationError::Decoding(self.message),
            RemoteErrorKind::UnknownType => FederationError::UnknownType(self.message),
            RemoteErrorKind::Authorization(a) => FederationError::Authorization(a),
            RemoteErrorKind::InvalidSignature => FederationError::SignatureInvalid,
            RemoteErrorKind::Replay => FederationError::Replay(self.message),
            RemoteErrorKind::Conflict => FederationError::Conflict(self.message),
            RemoteErrorKind::UnknownRecipient => FederationError::UnknownRecipient(self.message),
            RemoteErrorKind::NotFound => FederationError::NotFound(self.message),
            RemoteErrorKind::Busy | RemoteErrorKind::Internal => {
                FederationError::Remote(self.message)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyOutcome {
    /// Executed. `content` is JSON; actions carry their audit sequence.
    Ok {
        content: Vec<u8>,
        audit_sequence: Option<u64>,
    },
    Rejected(RemoteError),
}

/// A host-signed reply to one method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Frame number of the request.
    pub number: u64,
    pub method: ActionId,
    pub host: HostIdentifier,
    pub host_key: String,
    pub outcome: ReplyOutcome,
    pub replied_at: u64,
    pub signature: String,
}

impl Reply {
    /// Build and sign a reply with the host's key.
    pub fn sign(
        number: u64,
        method: ActionId,
        outcome: ReplyOutcome,
        host: &HostAnchor,
    ) -> Result<Self> {
        let mut reply = Self {
            number,
            method,
            host: host.identifier().clone(),
            host_key: host.public_key_base64(),
            outcome,
            replied_at: crate::time::now_micros(),
            signature: String::new(),
        };
        let digest = reply.digest()?;
        reply.signature = signing::sign_to_base64(host.signing_key(), digest.as_bytes());
        Ok(reply)
    }

    fn digest(&self) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.signature = String::new();
        let bytes = bincode::serialize(&unsigned)
            .map_err(|e| FederationError::SerializationError(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Check the reply is signed by the published key of its host.
    pub fn verify(&self, keyring: &HostKeyring) -> Result<()> {
        if !keyring.is_host_key(&self.host, &self.host_key) {
            return Err(FederationError::SignatureInvalid);
        }
        let digest = self.digest()?;
        signing::verify_with_key_base64(&self.host_key, digest.as_bytes(), &self.signature)
    }

    pub fn correlates(&self, number: u64, method: &ActionId) -> bool {
        self.number == number && &self.method == method
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, ReplyOutcome::Ok { .. })
    }

    pub fn audit_sequence(&self) -> Option<u64> {
        match &self.outcome {
            ReplyOutcome::Ok { audit_sequence, .. } => *audit_sequence,
            ReplyOutcome::Rejected(_) => None,
        }
    }

    /// The rejection, if any.
    pub fn error(&self) -> Option<&RemoteError> {
        match &self.outcome {
            ReplyOutcome::Rejected(e) => Some(e),
            ReplyOutcome::Ok { .. } => None,
        }
    }

    /// Decode the content of a successful reply.
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.outcome {
            ReplyOutcome::Ok { content, .. } => serde_json::from_slice(content)
                .map_err(|e| FederationError::Decoding(format!("reply content: {e}"))),
            ReplyOutcome::Rejected(e) => Err(e.clone().into_error()),
        }
    }

    /// Turn a rejection into an error, keeping successful replies.
    pub fn into_result(self) -> Result<Self> {
        match self.outcome {
            ReplyOutcome::Rejected(e) => Err(e.into_error()),
            ReplyOutcome::Ok { .. } => Ok(self),
        }
    }
}
