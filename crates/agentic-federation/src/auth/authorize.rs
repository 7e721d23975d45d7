//! Authorization: does a credential satisfy a method's requirements?
//!
//! Checks run in a fixed order and the first failure is reported:
//! 1. Credential not expired, agent (and its ancestors) not revoked
//! 2. Permissions cover the required permissions
//! 3. Restrictions satisfy the required restrictions
//! 4. The credential's agent is, or descends from, the required agent
//!
//! The same evaluation runs on the issuing side to fail fast and on the
//! executing side where it is authoritative.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AuthorizationError;
use crate::identity::AgentId;

use super::credential::Credential;
use super::permissions::Permissions;
use super::restrictions::Restrictions;
use super::revocation::RevocationList;

/// What a method (or an audit entry) requires of the acting credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    pub permissions: Permissions,
    pub restrictions: Restrictions,
    pub agent: Option<AgentId>,
}

impl Requirements {
    /// No requirement; any valid credential passes.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn restrictions(mut self, restrictions: Restrictions) -> Self {
        self.restrictions = restrictions;
        self
    }

    pub fn agent(mut self, agent: AgentId) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn is_none(&self) -> bool {
        *self == Self::none()
    }
}

/// Outcome of each check, for diagnostics.
#[derive(Debug, Clone)]
pub struct AuthorizationVerification {
    pub credential_current: bool,
    pub permissions_granted: bool,
    pub restrictions_met: bool,
    pub agent_matches: bool,
    /// The error the first failing check reports.
    pub first_failure: Option<AuthorizationError>,
}

impl AuthorizationVerification {
    pub fn is_authorized(&self) -> bool {
        self.first_failure.is_none()
    }
}

/// Evaluates credentials against requirements.
#[derive(Clone)]
pub struct Authorizer {
    revocations: Arc<RevocationList>,
    clock_skew_micros: u64,
}

impl Authorizer {
    pub fn new(revocations: Arc<RevocationList>, clock_skew_micros: u64) -> Self {
        Self {
            revocations,
            clock_skew_micros,
        }
    }

    pub fn revocations(&self) -> &Arc<RevocationList> {
        &self.revocations
    }

    /// Run every check at `now` and record which ones hold.
    pub fn evaluate_at(
        &self,
        required: &Requirements,
        credential: &Credential,
        now: u64,
    ) -> AuthorizationVerification {
        let credential_current = !credential.is_expired(now, self.clock_skew_micros)
            && !self
                .revocations
                .is_any_revoked(credential.agent_lineage.iter().chain([&credential.agent]));

        let missing_permission = credential.permissions.covers_all(&required.permissions).err();
        let unmet_restriction = credential.restrictions.covers(&required.restrictions).err();
        let agent_matches = required
            .agent
            .as_ref()
            .map_or(true, |a| credential.agent_is_covered_by(a));

        let first_failure = if !credential_current {
            Some(AuthorizationError::RevokedCredential)
        } else if let Some(missing) = missing_permission.clone() {
            Some(AuthorizationError::InsufficientPermissions(missing))
        } else if let Some(unmet) = unmet_restriction.clone() {
            Some(AuthorizationError::InsufficientRestrictions(unmet))
        } else if !agent_matches {
            Some(AuthorizationError::WrongAgent {
                required: required
                    .agent
                    .as_ref()
                    .map(|a| a.0.clone())
                    .unwrap_or_default(),
                actual: credential.agent.0.clone(),
            })
        } else {
            None
        };

        AuthorizationVerification {
            credential_current,
            permissions_granted: missing_permission.is_none(),
            restrictions_met: unmet_restriction.is_none(),
            agent_matches,
            first_failure,
        }
    }

    /// Authorize at the current time.
    pub fn authorize(
        &self,
        required: &Requirements,
        credential: &Credential,
    ) -> Result<(), AuthorizationError> {
        match self
            .evaluate_at(required, credential, crate::time::now_micros())
            .first_failure
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Authorize a possibly absent credential.
    ///
    /// Without a credential only requirement-free methods pass.
    pub fn authorize_optional(
        &self,
        required: &Requirements,
        credential: Option<&Credential>,
    ) -> Result<(), AuthorizationError> {
        match credential {
            Some(c) => self.authorize(required, c),
            None if required.is_none() => Ok(()),
            None => Err(AuthorizationError::MissingCredential),
        }
    }

    /// Visibility predicate for audit reads: never an error, only yes/no.
    pub fn can_see(&self, required: &Requirements, viewer: &Credential) -> bool {
        self.authorize(required, viewer).is_ok()
    }
}
