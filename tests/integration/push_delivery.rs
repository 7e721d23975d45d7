//! Cross-host delivery of external actions.
//!
//! Two hosts share a keyring. alice@example.org asks bob@other.org for
//! access; the request travels through the push service over an
//! in-process transport that can be told to fail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use agentic_federation::auth::CredentialBuilder;
use agentic_federation::crypto::keys::Ed25519KeyPair;
use agentic_federation::identity::{Account, AgentId};
use agentic_federation::method::{self, Frame, Reply};
use agentic_federation::property::{request_access, PropertySlot, PropertyTableId};
use agentic_federation::push::{LoopbackTransport, MemoryFailureStore, TransportError};
use agentic_federation::{
    Directory, Dispatcher, Entity, FailureStore, FederationConfig, Host, HostAnchor,
    HostIdentifier, HostKeyring, HostServices, InternalIdentifier, Method, Permissions,
    PropertyStore, PushConfig, PushService, PushState, Transport,
};

/// Loopback that fails the first `failures` sends with a network error,
/// and can re-sign every reply with a key nobody published.
struct Flaky {
    inner: LoopbackTransport,
    failures: AtomicUsize,
    sends: AtomicUsize,
    forger: Mutex<Option<HostAnchor>>,
}

impl Flaky {
    fn new(failures: usize) -> Self {
        Self {
            inner: LoopbackTransport::new(),
            failures: AtomicUsize::new(failures),
            sends: AtomicUsize::new(0),
            forger: Mutex::new(None),
        }
    }

    fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    fn forge_replies_as(&self, host: &str) {
        *self.forger.lock().unwrap() = Some(HostAnchor::new(HostIdentifier::new(host).unwrap()));
    }

    fn forge(&self, bytes: Vec<u8>) -> Vec<u8> {
        let forger = self.forger.lock().unwrap();
        let Some(forger) = forger.as_ref() else {
            return bytes;
        };
        let frame = Frame::decode(&bytes).unwrap();
        let reply = method::decode_reply(&frame.body).unwrap();
        let forged = Reply::sign(reply.number, reply.method, reply.outcome, forger).unwrap();
        Frame::new(frame.number, method::encode_reply(&forged).unwrap())
            .encode()
            .unwrap()
    }
}

#[async_trait]
impl Transport for Flaky {
    async fn send(
        &self,
        recipient: &HostIdentifier,
        frame: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Network("connection reset".into()));
        }
        let reply = self.inner.send(recipient, frame).await?;
        Ok(self.forge(reply))
    }
}

struct Federation {
    example: Arc<Host>,
    other: Arc<Host>,
    transport: Arc<Flaky>,
    push: PushService,
    failures: Arc<MemoryFailureStore>,
    alice: Entity,
    bob: InternalIdentifier,
}

fn host(name: &str, keyring: &Arc<HostKeyring>, directory: &Arc<Directory>) -> Arc<Host> {
    let anchor = HostAnchor::new(HostIdentifier::new(name).unwrap());
    keyring.insert(anchor.to_document()).unwrap();
    Arc::new(Host::new(
        anchor,
        HostServices::in_memory(directory.clone(), keyring.clone()),
        &FederationConfig::default(),
    ))
}

fn federation(failures: usize, max_attempts: u32, attach_other: bool) -> Federation {
    let keyring = Arc::new(HostKeyring::new());
    let directory = Arc::new(Directory::new());
    let alice_id = InternalIdentifier::new("alice@example.org").unwrap();
    let bob = InternalIdentifier::new("bob@other.org").unwrap();
    let alice_identity = directory.register(alice_id.clone()).unwrap();
    directory.register(bob.clone()).unwrap();

    let example = host("example.org", &keyring, &directory);
    let other = host("other.org", &keyring, &directory);

    let transport = Arc::new(Flaky::new(failures));
    if attach_other {
        transport.inner.attach(other.clone());
    }
    let failure_store = Arc::new(MemoryFailureStore::new());
    let config = PushConfig {
        max_attempts,
        base_delay_ms: 5,
        max_delay_ms: 20,
        ..PushConfig::default()
    };
    let push = PushService::new(
        transport.clone(),
        failure_store.clone(),
        keyring,
        &config,
        tokio::runtime::Handle::current(),
    );

    Federation {
        alice: Entity::Account(Account {
            host: example.identifier().clone(),
            identity: alice_identity,
        }),
        example,
        other,
        transport,
        push,
        failures: failure_store,
        bob,
    }
}

impl Federation {
    /// An access request presented with example.org's host credential.
    fn request(&self) -> Method {
        let anchor = self.example.anchor();
        let credential = CredentialBuilder::host(anchor.identifier().clone())
            .agent(AgentId("aagent_example_host".into()), anchor.public_key_base64())
            .sign(anchor)
            .unwrap();
        request_access(
            &self.alice,
            &self.bob,
            Permissions::read("contact:list"),
            Some("colleague".into()),
        )
        .unwrap()
        .with_credential(credential)
        .sign(anchor.signing_key())
        .unwrap()
    }

    fn entries_on_other(&self) -> u64 {
        self.other
            .audit()
            .last_sequence(&agentic_federation::EntityKey::account(&self.bob))
            .unwrap()
    }

    fn stored_request(&self) -> Option<serde_json::Value> {
        self.other
            .properties()
            .get(&PropertySlot::element(
                PropertyTableId::new("access.requests"),
                self.bob.clone(),
                "alice@example.org".into(),
            ))
            .unwrap()
    }
}

#[tokio::test]
async fn test_delivered_after_transient_failures() {
    let fed = federation(3, 5, true);
    let token = fed.push.submit(fed.request()).unwrap();

    assert_eq!(fed.push.wait(&token).await, Some(PushState::Delivered));
    assert_eq!(fed.transport.sends(), 4);
    assert_eq!(fed.entries_on_other(), 1);
    assert!(fed.stored_request().is_some());
    assert!(fed.failures.list().unwrap().is_empty());
    assert!(fed.push.task(&token).is_none(), "delivered tasks are dropped");
}

#[tokio::test]
async fn test_permanent_rejection_is_not_retried() {
    let fed = federation(0, 5, true);
    // A client credential cannot carry a cross-host request.
    let anchor = fed.example.anchor();
    let agent = agentic_federation::Agent::new(
        fed.alice.identity().address.clone(),
        anchor.public_key_base64(),
        Permissions::root(),
        agentic_federation::Restrictions::full_client(),
    );
    let credential = CredentialBuilder::client(agent.identity.clone())
        .for_agent(&agent)
        .sign(anchor)
        .unwrap();
    let request = request_access(&fed.alice, &fed.bob, Permissions::new(), None)
        .unwrap()
        .with_credential(credential)
        .sign(anchor.signing_key())
        .unwrap();

    let token = fed.push.submit(request).unwrap();
    assert_eq!(fed.push.wait(&token).await, Some(PushState::PermanentlyFailed));
    assert_eq!(fed.transport.sends(), 1);
    assert_eq!(fed.entries_on_other(), 0);

    let ids = fed.failures.list().unwrap();
    assert_eq!(ids.len(), 1);
    let record = fed.failures.load(&ids[0]).unwrap();
    assert_eq!(record.token, token);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.recipient, fed.bob.host());
}

#[tokio::test]
async fn test_invalid_signature_is_not_retried() {
    let fed = federation(0, 5, true);
    let tampered = fed.request().sign(Ed25519KeyPair::generate().signing_key()).unwrap();

    let token = fed.push.submit(tampered).unwrap();
    assert_eq!(fed.push.wait(&token).await, Some(PushState::PermanentlyFailed));
    assert_eq!(fed.transport.sends(), 1);
    assert_eq!(fed.entries_on_other(), 0);
    assert!(fed.stored_request().is_none());

    let ids = fed.failures.list().unwrap();
    assert_eq!(ids.len(), 1);
    let record = fed.failures.load(&ids[0]).unwrap();
    assert_eq!(record.token, token);
    assert_eq!(record.attempts, 1);
}

#[tokio::test]
async fn test_forged_reply_is_not_trusted() {
    let fed = federation(0, 5, true);
    fed.transport.forge_replies_as("other.org");

    let token = fed.push.submit(fed.request()).unwrap();
    assert_eq!(fed.push.wait(&token).await, Some(PushState::PermanentlyFailed));
    assert_eq!(fed.transport.sends(), 1);

    let ids = fed.failures.list().unwrap();
    assert_eq!(ids.len(), 1);
    let record = fed.failures.load(&ids[0]).unwrap();
    assert_eq!(record.attempts, 1);
    assert!(record.last_error.contains("reply signature invalid"));
}

#[tokio::test]
async fn test_redelivery_of_recorded_action_counts_as_delivered() {
    let fed = federation(0, 5, true);
    let request = fed.request();
    let first = fed.push.submit(request.clone()).unwrap();
    assert_eq!(fed.push.wait(&first).await, Some(PushState::Delivered));

    let again = fed.push.submit(request).unwrap();
    assert_eq!(fed.push.wait(&again).await, Some(PushState::Delivered));
    assert_eq!(fed.entries_on_other(), 1);
}

#[tokio::test]
async fn test_retries_exhausted() {
    let fed = federation(usize::MAX, 3, true);
    let token = fed.push.submit(fed.request()).unwrap();

    assert_eq!(fed.push.wait(&token).await, Some(PushState::PermanentlyFailed));
    assert_eq!(fed.transport.sends(), 3);
    let ids = fed.failures.list().unwrap();
    assert_eq!(fed.failures.load(&ids[0]).unwrap().attempts, 3);
    assert_eq!(fed.entries_on_other(), 0);
}

#[tokio::test]
async fn test_cancel_while_retrying() {
    let fed = federation(usize::MAX, 100, true);
    let token = fed.push.submit(fed.request()).unwrap();

    while fed.push.state(&token) != Some(PushState::Retrying) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(fed.push.cancel(&token));
    assert_eq!(fed.push.wait(&token).await, Some(PushState::Cancelled));
    assert!(!fed.push.cancel(&token));
    assert!(fed.failures.list().unwrap().is_empty());
}

#[tokio::test]
async fn test_resend_after_route_appears() {
    let fed = federation(0, 5, false);
    let token = fed.push.submit(fed.request()).unwrap();
    assert_eq!(fed.push.wait(&token).await, Some(PushState::PermanentlyFailed));

    let ids = fed.failures.list().unwrap();
    assert_eq!(ids.len(), 1);

    fed.transport.inner.attach(fed.other.clone());
    let resent = fed.push.resend(&ids[0]).unwrap();
    assert_eq!(fed.push.wait(&resent).await, Some(PushState::Delivered));
    assert!(fed.failures.list().unwrap().is_empty());
    assert_eq!(fed.entries_on_other(), 1);
}

#[tokio::test]
async fn test_dispatcher_hands_external_actions_to_push() {
    let fed = federation(0, 5, true);
    let config = FederationConfig::default();
    let dispatcher = Dispatcher::new(
        fed.example.registry().clone(),
        fed.example.keyring().clone(),
        fed.example.authorizer().revocations().clone(),
        &config,
    )
    .with_push(fed.push.clone());

    let dispatched = dispatcher.dispatch(fed.request()).unwrap();
    let token = dispatched.token().unwrap();
    assert_eq!(fed.push.wait(token).await, Some(PushState::Delivered));
    assert!(fed.stored_request().is_some());
}

#[tokio::test]
async fn test_internal_methods_are_refused_by_push() {
    let fed = federation(0, 5, true);
    let internal = agentic_federation::property::replace_value(
        &fed.alice,
        "attribute.name",
        None,
        Some(serde_json::json!("Alice")),
    )
    .unwrap();
    assert!(fed.push.submit(internal).is_err());
}
