//! Credentials: issuer-signed proof of an agent's rights.
//!
//! A credential says "host H vouches that the holder of key K acts as
//! agent A with {permissions} under {restrictions} until T." Host
//! credentials are identity-bound and used host-to-host. Client credentials
//! name their identity unless they are anonymous, in which case they carry
//! a commitment element instead and a per-use verifiable-encryption proof.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::signing;
use crate::error::{AuthorizationError, FederationError, Result};
use crate::identity::{Agent, AgentId, HostAnchor, HostIdentifier, InternalIdentifier};

use super::permissions::Permissions;
use super::restrictions::Restrictions;
use super::verifiable::{AnonymousProof, AnonymousSecrets};

/// Default validity of a credential: one hour.
pub const DEFAULT_VALIDITY_MICROS: u64 = 3_600 * 1_000_000;

/// Unique identifier for a credential.
///
/// Format: `acred_` + base58 of first 16 bytes of SHA-256(credential_hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialId(pub String);

impl std::fmt::Display for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who the credential is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialKind {
    /// A host acting for itself towards another host.
    Host { host: HostIdentifier },
    /// A client agent; `identity` is `None` for anonymous credentials.
    Client { identity: Option<InternalIdentifier> },
}

/// Which credentials may act on a method's subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectBinding {
    /// Client credentials of the subject, issued by the subject's host.
    /// Anonymous ones must carry a commitment the subject registered.
    Subject,
    /// Host credentials only; the handler decides which hosts it accepts.
    Host,
}

/// A signed statement of an agent's rights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub kind: CredentialKind,
    pub issuer: HostIdentifier,
    pub issuer_key: String,
    pub agent: AgentId,
    /// Ancestors of `agent`, root first.
    pub agent_lineage: Vec<AgentId>,
    /// Public key (base64) that signs methods presented with this credential.
    pub holder_key: String,
    pub permissions: Permissions,
    pub restrictions: Restrictions,
    pub issued_at: u64,
    pub expires_at: u64,
    /// Public commitment element of an anonymous credential (hex).
    pub commitment: Option<String>,
    pub credential_hash: String,
    pub signature: String,
    /// Per-verifier verifiable-encryption proof; not covered by the signature.
    pub proof: Option<AnonymousProof>,
}

impl Credential {
    /// Recompute the hash over all signed fields.
    pub fn compute_hash(&self) -> Result<String> {
        hash_fields(&SignedFields {
            kind: &self.kind,
            issuer: &self.issuer,
            issuer_key: &self.issuer_key,
            agent: &self.agent,
            agent_lineage: &self.agent_lineage,
            holder_key: &self.holder_key,
            permissions: &self.permissions,
            restrictions: &self.restrictions,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            commitment: self.commitment.as_deref(),
        })
    }

    /// Verify the issuer's signature over this credential.
    ///
    /// This does not check *which* key signed; see `CredentialVerifier`.
    pub fn verify_signature(&self) -> Result<()> {
        if self.compute_hash()? != self.credential_hash {
            return Err(FederationError::SignatureInvalid);
        }
        signing::verify_with_key_base64(
            &self.issuer_key,
            self.credential_hash.as_bytes(),
            &self.signature,
        )
    }

    pub fn is_expired(&self, now: u64, skew_micros: u64) -> bool {
        now > self.expires_at.saturating_add(skew_micros)
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self.kind, CredentialKind::Client { identity: None })
    }

    /// The identity the credential names, if it names one.
    pub fn identity(&self) -> Option<&InternalIdentifier> {
        match &self.kind {
            CredentialKind::Host { .. } => None,
            CredentialKind::Client { identity } => identity.as_ref(),
        }
    }

    /// Check that this credential may act on `subject`.
    ///
    /// `commitments` are the anonymous commitments the subject registered.
    /// The issuing side does not know them and passes `None`, which lets
    /// anonymous credentials through until the executing host decides.
    pub fn check_subject(
        &self,
        subject: &InternalIdentifier,
        commitments: Option<&BTreeSet<String>>,
        binding: SubjectBinding,
    ) -> std::result::Result<(), AuthorizationError> {
        let bound = match (binding, &self.kind) {
            (SubjectBinding::Host, CredentialKind::Host { .. }) => true,
            (SubjectBinding::Host, CredentialKind::Client { .. }) => false,
            (SubjectBinding::Subject, CredentialKind::Host { .. }) => false,
            (SubjectBinding::Subject, CredentialKind::Client { .. })
                if self.issuer != subject.host() =>
            {
                false
            }
            (SubjectBinding::Subject, CredentialKind::Client { identity: Some(id) }) => {
                id == subject
            }
            (SubjectBinding::Subject, CredentialKind::Client { identity: None }) => {
                match (commitments, &self.commitment) {
                    (None, _) => true,
                    (Some(known), Some(commitment)) => known.contains(commitment),
                    (Some(_), None) => false,
                }
            }
        };
        if bound {
            Ok(())
        } else {
            Err(AuthorizationError::WrongSubject {
                subject: subject.to_string(),
                credential: self.id.to_string(),
            })
        }
    }

    /// Whether `required` is this credential's agent or one of its ancestors.
    pub fn agent_is_covered_by(&self, required: &AgentId) -> bool {
        &self.agent == required || self.agent_lineage.contains(required)
    }

    /// Attach a verifiable-encryption proof for one verifier.
    pub fn with_proof(mut self, proof: AnonymousProof) -> Self {
        self.proof = Some(proof);
        self
    }
}

#[derive(Serialize)]
struct SignedFields<'a> {
    kind: &'a CredentialKind,
    issuer: &'a HostIdentifier,
    issuer_key: &'a str,
    agent: &'a AgentId,
    agent_lineage: &'a [AgentId],
    holder_key: &'a str,
    permissions: &'a Permissions,
    restrictions: &'a Restrictions,
    issued_at: u64,
    expires_at: u64,
    commitment: Option<&'a str>,
}

fn hash_fields(fields: &SignedFields<'_>) -> Result<String> {
    let json = serde_json::to_string(fields)
        .map_err(|e| FederationError::SerializationError(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(json.as_bytes())))
}

/// Builder for issuing credentials.
pub struct CredentialBuilder {
    kind: CredentialKind,
    agent: Option<AgentId>,
    agent_lineage: Vec<AgentId>,
    holder_key: Option<String>,
    permissions: Permissions,
    restrictions: Restrictions,
    validity_micros: u64,
    commitment: Option<String>,
    revoked_agent: bool,
}

impl CredentialBuilder {
    fn with_kind(kind: CredentialKind) -> Self {
        Self {
            kind,
            agent: None,
            agent_lineage: Vec::new(),
            holder_key: None,
            permissions: Permissions::new(),
            restrictions: Restrictions::none(),
            validity_micros: DEFAULT_VALIDITY_MICROS,
            commitment: None,
            revoked_agent: false,
        }
    }

    /// A host credential; the issuing host must be `host` itself.
    pub fn host(host: HostIdentifier) -> Self {
        Self::with_kind(CredentialKind::Host { host })
    }

    /// A client credential naming its identity.
    pub fn client(identity: InternalIdentifier) -> Self {
        Self::with_kind(CredentialKind::Client {
            identity: Some(identity),
        })
    }

    /// An anonymous client credential committed to `secrets`.
    pub fn anonymous(secrets: &AnonymousSecrets) -> Self {
        let mut builder = Self::with_kind(CredentialKind::Client { identity: None });
        builder.commitment = Some(secrets.commitment());
        builder
    }

    /// Take agent id, lineage, key, permissions and restrictions from `agent`.
    ///
    /// A revoked agent makes `sign` fail.
    pub fn for_agent(mut self, agent: &Agent) -> Self {
        self.revoked_agent = agent.is_revoked();
        self.agent = Some(agent.id.clone());
        self.agent_lineage = agent.lineage.clone();
        self.holder_key = Some(agent.key.clone());
        self.permissions = agent.permissions.clone();
        self.restrictions = agent.restrictions.clone();
        self
    }

    pub fn agent(mut self, agent: AgentId, holder_key: String) -> Self {
        self.agent = Some(agent);
        self.holder_key = Some(holder_key);
        self
    }

    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn restrictions(mut self, restrictions: Restrictions) -> Self {
        self.restrictions = restrictions;
        self
    }

    pub fn valid_for(mut self, micros: u64) -> Self {
        self.validity_micros = micros;
        self
    }

    /// Sign and finalize the credential with the issuing host's key.
    pub fn sign(self, issuer: &HostAnchor) -> Result<Credential> {
        if let CredentialKind::Host { host } = &self.kind {
            if host != issuer.identifier() {
                return Err(FederationError::MalformedMethod(format!(
                    "host credential for {host} cannot be issued by {}",
                    issuer.identifier()
                )));
            }
        }
        let agent = self
            .agent
            .ok_or_else(|| FederationError::MalformedMethod("credential has no agent".into()))?;
        if self.revoked_agent {
            log::warn!("refusing to issue a credential for revoked agent {agent}");
            return Err(AuthorizationError::RevokedCredential.into());
        }
        let holder_key = self.holder_key.unwrap_or_default();

        let now = crate::time::now_micros();
        let issuer_key = issuer.public_key_base64();
        let expires_at = now.saturating_add(self.validity_micros);

        let credential_hash = hash_fields(&SignedFields {
            kind: &self.kind,
            issuer: issuer.identifier(),
            issuer_key: &issuer_key,
            agent: &agent,
            agent_lineage: &self.agent_lineage,
            holder_key: &holder_key,
            permissions: &self.permissions,
            restrictions: &self.restrictions,
            issued_at: now,
            expires_at,
            commitment: self.commitment.as_deref(),
        })?;

        let id_hash = Sha256::digest(credential_hash.as_bytes());
        let id = CredentialId(format!("acred_{}", bs58::encode(&id_hash[..16]).into_string()));
        let signature = signing::sign_to_base64(issuer.signing_key(), credential_hash.as_bytes());

        Ok(Credential {
            id,
            kind: self.kind,
            issuer: issuer.identifier().clone(),
            issuer_key,
            agent,
            agent_lineage: self.agent_lineage,
            holder_key,
            permissions: self.permissions,
            restrictions: self.restrictions,
            issued_at: now,
            expires_at,
            commitment: self.commitment,
            credential_hash,
            signature,
            proof: None,
        })
    }
}
