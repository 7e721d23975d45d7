//! The executing host.
//!
//! A host receives methods for its identities and runs each one through
//! the same steps:
//! 1. Envelope invariants and the handler for the type tag
//! 2. Method signature and presented credential
//! 3. Subject resolution and binding of the credential to the subject
//! 4. Authorization against requirements the handler recomputes
//! 5. For actions, under the entity lock: replay check, side effect,
//!    audit append, and rollback of the side effect if the append fails
//!
//! Every outcome, success or rejection, is answered with a signed reply.

use std::sync::Arc;

use crate::audit::{AuditEntry, AuditLog, AuditStore};
use crate::auth::{Authorizer, CredentialVerifier, RevocationList};
use crate::config::FederationConfig;
use crate::error::{FederationError, Result};
use crate::identity::{
    Account, EntityKey, HostAnchor, HostDocument, HostIdentifier, HostKeyring, IdentifierResolver,
};
use crate::method::{
    self, ActionId, ExecutionContext, Frame, Method, MethodHandler, MethodKind, MethodRegistry,
    RemoteError, Reply, ReplyOutcome,
};
use crate::property::{revert_changes, MemoryPropertyStore, PropertyCatalog, PropertyStore};
use crate::storage::MemoryAuditStore;

/// The collaborators a host executes against.
pub struct HostServices {
    pub resolver: Arc<dyn IdentifierResolver>,
    pub keyring: Arc<HostKeyring>,
    pub revocations: Arc<RevocationList>,
    pub registry: Arc<MethodRegistry>,
    pub audit_store: Arc<dyn AuditStore>,
    pub properties: Arc<dyn PropertyStore>,
}

impl HostServices {
    /// In-memory stores and the core method registry.
    pub fn in_memory(resolver: Arc<dyn IdentifierResolver>, keyring: Arc<HostKeyring>) -> Self {
        Self {
            resolver,
            keyring,
            revocations: Arc::new(RevocationList::new()),
            registry: Arc::new(MethodRegistry::with_core(Arc::new(PropertyCatalog::core()))),
            audit_store: Arc::new(MemoryAuditStore::new()),
            properties: Arc::new(MemoryPropertyStore::new()),
        }
    }
}

/// What a successfully executed method produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    /// Reply content (JSON).
    pub content: Vec<u8>,
    /// Audit sequence number, for actions.
    pub audit_sequence: Option<u64>,
}

pub struct Host {
    anchor: HostAnchor,
    resolver: Arc<dyn IdentifierResolver>,
    keyring: Arc<HostKeyring>,
    authorizer: Authorizer,
    registry: Arc<MethodRegistry>,
    audit: AuditLog,
    properties: Arc<dyn PropertyStore>,
}

impl Host {
    pub fn new(anchor: HostAnchor, services: HostServices, config: &FederationConfig) -> Self {
        log::info!("host {} ready", anchor.identifier());
        Self {
            authorizer: Authorizer::new(
                services.revocations,
                config.credential.clock_skew_micros(),
            ),
            audit: AuditLog::new(services.audit_store, config.audit.read_page_limit),
            anchor,
            resolver: services.resolver,
            keyring: services.keyring,
            registry: services.registry,
            properties: services.properties,
        }
    }

    pub fn identifier(&self) -> &HostIdentifier {
        self.anchor.identifier()
    }

    pub fn anchor(&self) -> &HostAnchor {
        &self.anchor
    }

    pub fn document(&self) -> HostDocument {
        self.anchor.to_document()
    }

    pub fn keyring(&self) -> &Arc<HostKeyring> {
        &self.keyring
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn properties(&self) -> &Arc<dyn PropertyStore> {
        &self.properties
    }

    /// Execute a method addressed to this host.
    pub fn execute(&self, method: &Method) -> Result<Executed> {
        if &method.recipient != self.identifier() {
            return Err(FederationError::UnknownRecipient(format!(
                "{} is not served by {}",
                method.recipient,
                self.identifier()
            )));
        }
        method.check_invariants()?;
        let handler = self.registry.get(&method.method_type)?;
        if handler.kind() != method.kind {
            return Err(FederationError::Decoding(format!(
                "{} is not a {:?}",
                method.method_type, method.kind
            )));
        }
        handler.validate(method)?;
        self.verify_presented(method)?;

        let account = Account {
            host: self.identifier().clone(),
            identity: self.resolver.resolve(&method.subject)?,
        };
        if let Some(credential) = &method.credential {
            credential.check_subject(
                &method.subject,
                Some(&account.identity.anonymous_commitments),
                handler.subject_binding(),
            )?;
        }
        let requirements = handler.requirements(method)?;
        self.authorizer
            .authorize_optional(&requirements, method.credential.as_ref())?;

        let ctx = ExecutionContext {
            host: self.identifier(),
            account: &account,
            credential: method.credential.as_ref(),
            properties: self.properties.as_ref(),
            audit: &self.audit,
            authorizer: &self.authorizer,
        };
        match method.kind {
            MethodKind::Query => Ok(Executed {
                content: handler.execute(&ctx, method)?.content,
                audit_sequence: None,
            }),
            MethodKind::Action => self.record_action(handler.as_ref(), &ctx, method),
        }
    }

    /// Check the method signature and the credential it presents.
    ///
    /// A presented credential must be backed by a signature of its holder.
    fn verify_presented(&self, method: &Method) -> Result<()> {
        match (&method.credential, &method.signature) {
            (Some(credential), Some(_)) => {
                let signature = method.verify_signature()?;
                CredentialVerifier::new(&self.keyring)
                    .with_encryption_keys(self.anchor.encryption_keys())
                    .verify(credential)?;
                if signature.signer_key != credential.holder_key {
                    log::warn!(
                        "{} signed by a key that does not hold credential {}",
                        method.id,
                        credential.id
                    );
                    return Err(FederationError::SignatureInvalid);
                }
                Ok(())
            }
            (Some(_), None) => Err(FederationError::SignatureInvalid),
            (None, Some(_)) => method.verify_signature().map(|_| ()),
            (None, None) => Ok(()),
        }
    }

    fn record_action(
        &self,
        handler: &dyn MethodHandler,
        ctx: &ExecutionContext<'_>,
        method: &Method,
    ) -> Result<Executed> {
        let entity = EntityKey::account(&method.subject);
        let visibility = handler.audit_requirements(method)?;

        self.audit.with_entity(&entity, |session| {
            if session.contains_action(&method.id)? {
                log::warn!("{} replayed against {entity}", method.id);
                return Err(FederationError::Replay(method.id.to_string()));
            }
            let execution = handler.execute(ctx, method)?;
            let sequence = session.next_sequence();
            let appended = AuditEntry::record(
                sequence,
                entity.clone(),
                method,
                handler.describe(method),
                visibility,
            )
            .and_then(|entry| session.append(entry));

            if let Err(e) = appended {
                log::warn!("audit append for {} failed, rolling back: {e}", method.id);
                if let Err(undo) = revert_changes(self.properties.as_ref(), &execution.changes) {
                    log::error!("rollback of {} incomplete: {undo}", method.id);
                }
                return Err(match e {
                    FederationError::AuditAppend(_) => e,
                    other => FederationError::AuditAppend(other.to_string()),
                });
            }
            log::debug!("{} recorded as {entity} #{sequence}", method.id);
            Ok(Executed {
                content: execution.content,
                audit_sequence: Some(sequence),
            })
        })
    }

    /// Execute and answer with a signed reply numbered `number`.
    pub fn process(&self, number: u64, method: &Method) -> Result<Reply> {
        let outcome = match self.execute(method) {
            Ok(executed) => ReplyOutcome::Ok {
                content: executed.content,
                audit_sequence: executed.audit_sequence,
            },
            Err(e) => {
                log::warn!("{} ({}) rejected: {e}", method.id, method.method_type);
                ReplyOutcome::Rejected(RemoteError::from_error(&e))
            }
        };
        Reply::sign(number, method.id.clone(), outcome, &self.anchor)
    }

    /// Answer one encoded request frame with an encoded reply frame.
    ///
    /// Only a frame that cannot be read at all is an error; everything
    /// after that is answered with a reply.
    pub fn handle_frame(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let frame = Frame::decode(bytes)?;
        let reply = match method::decode(&frame.body, &self.registry) {
            Ok(method) => self.process(frame.number, &method)?,
            Err(e) => {
                let id = method::decode_envelope(&frame.body)
                    .map(|m| m.id)
                    .unwrap_or_else(|_| ActionId(String::new()));
                log::warn!("frame #{} rejected: {e}", frame.number);
                Reply::sign(
                    frame.number,
                    id,
                    ReplyOutcome::Rejected(RemoteError::from_error(&e)),
                    &self.anchor,
                )?
            }
        };
        Frame::new(frame.number, method::encode_reply(&reply)?).encode()
    }
}
