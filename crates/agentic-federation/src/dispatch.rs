//! Issuing-side dispatch.
//!
//! The dispatcher checks a method before it leaves the caller: envelope
//! invariants, payload, the credential's subject and an optimistic
//! authorization of the presented credential. Internal methods then run
//! synchronously on the local recipient host; external actions are
//! handed to push delivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::auth::{Authorizer, RevocationList};
use crate::config::FederationConfig;
use crate::error::{FederationError, Result};
use crate::host::Host;
use crate::identity::{HostIdentifier, HostKeyring};
use crate::method::{Method, MethodRegistry, MethodScope, Reply};
use crate::push::{DeliveryToken, PushService};

/// Outcome of a dispatch.
#[derive(Debug)]
pub enum Dispatched {
    /// An internal method ran; its successful reply.
    Replied(Reply),
    /// An external action is on its way.
    Pending(DeliveryToken),
}

impl Dispatched {
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            Self::Replied(reply) => Some(reply),
            Self::Pending(_) => None,
        }
    }

    pub fn token(&self) -> Option<&DeliveryToken> {
        match self {
            Self::Pending(token) => Some(token),
            Self::Replied(_) => None,
        }
    }
}

pub struct Dispatcher {
    hosts: HashMap<HostIdentifier, Arc<Host>>,
    registry: Arc<MethodRegistry>,
    authorizer: Authorizer,
    keyring: Arc<HostKeyring>,
    push: Option<PushService>,
    numbers: AtomicU64,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<MethodRegistry>,
        keyring: Arc<HostKeyring>,
        revocations: Arc<RevocationList>,
        config: &FederationConfig,
    ) -> Self {
        Self {
            hosts: HashMap::new(),
            registry,
            authorizer: Authorizer::new(revocations, config.credential.clock_skew_micros()),
            keyring,
            push: None,
            numbers: AtomicU64::new(0),
        }
    }

    /// Deliver external actions through `push`.
    pub fn with_push(mut self, push: PushService) -> Self {
        self.push = Some(push);
        self
    }

    /// Make `host` reachable for internal methods.
    pub fn add_host(&mut self, host: Arc<Host>) {
        self.hosts.insert(host.identifier().clone(), host);
    }

    pub fn push(&self) -> Option<&PushService> {
        self.push.as_ref()
    }

    /// The checks run before a method leaves the caller.
    pub fn check(&self, method: &Method) -> Result<()> {
        method.check_invariants()?;
        let handler = self.registry.get(&method.method_type)?;
        if handler.kind() != method.kind {
            return Err(FederationError::MalformedMethod(format!(
                "{} is not a {:?}",
                method.method_type, method.kind
            )));
        }
        handler.validate(method)?;
        if let Some(credential) = &method.credential {
            credential.check_subject(&method.subject, None, handler.subject_binding())?;
        }
        let requirements = handler.requirements(method)?;
        self.authorizer
            .authorize_optional(&requirements, method.credential.as_ref())?;
        Ok(())
    }

    /// Send a method to its recipient.
    ///
    /// Rejections of internal methods are returned as errors. External
    /// actions never fail here once checked; their outcome is tracked by
    /// the returned token.
    pub fn dispatch(&self, method: Method) -> Result<Dispatched> {
        self.check(&method)?;
        match method.scope {
            MethodScope::Internal => {
                let host = self.hosts.get(&method.recipient).ok_or_else(|| {
                    FederationError::UnknownRecipient(method.recipient.to_string())
                })?;
                let number = self.numbers.fetch_add(1, Ordering::Relaxed) + 1;
                let reply = host.process(number, &method)?;
                reply.verify(&self.keyring)?;
                if !reply.correlates(number, &method.id) {
                    return Err(FederationError::Remote(format!(
                        "reply #{} does not answer #{number}",
                        reply.number
                    )));
                }
                reply.into_result().map(Dispatched::Replied)
            }
            MethodScope::External => {
                let push = self.push.as_ref().ok_or_else(|| {
                    FederationError::UnknownRecipient(format!(
                        "no push delivery configured for {}",
                        method.recipient
                    ))
                })?;
                push.submit(method).map(Dispatched::Pending)
            }
        }
    }
}
