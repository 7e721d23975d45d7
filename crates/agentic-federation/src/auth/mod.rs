//! Authorization engine and credential verification.
//!
//! The auth module provides:
//! - Permission names with wildcard matching and read/write access
//! - Structural restrictions (client, role, writing, context)
//! - Signed credentials, including anonymous ones
//! - Verifiable encryption for anonymous credentials
//! - Agent revocation
//! - The ordered authorization check

pub mod authorize;
pub mod credential;
pub mod permissions;
pub mod restrictions;
pub mod revocation;
pub mod verifiable;
pub mod verify;

pub use authorize::{AuthorizationVerification, Authorizer, Requirements};
pub use credential::{Credential, CredentialBuilder, CredentialId, CredentialKind, SubjectBinding};
pub use permissions::{permission_name_covers, Access, Permissions};
pub use restrictions::Restrictions;
pub use revocation::{Revocation, RevocationList, RevocationReason};
pub use verifiable::{AnonymousProof, AnonymousSecrets, VerifiableEncryption};
pub use verify::CredentialVerifier;
