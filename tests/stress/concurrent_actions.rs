//! Concurrency test: many threads executing actions against one host.
//!
//! Validates that audit sequences stay gap-free per entity and that
//! concurrent stale writes resolve to exactly one winner.

use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::json;

use agentic_federation::crypto::keys::Ed25519KeyPair;
use agentic_federation::crypto::signing::public_key_to_base64;
use agentic_federation::property::{modify_map, replace_value};
use agentic_federation::{
    Account, Agent, AuditStore, Credential, CredentialBuilder, Directory, Entity, EntityKey,
    FederationConfig, FederationError, Host, HostAnchor, HostIdentifier, HostKeyring,
    HostServices, InternalIdentifier, Method, Permissions, Restrictions,
};

struct Signer {
    credential: Credential,
    key: Ed25519KeyPair,
}

impl Signer {
    fn new(host: &Host, identity: &InternalIdentifier) -> Self {
        let key = Ed25519KeyPair::generate();
        let agent = Agent::new(
            identity.clone(),
            public_key_to_base64(key.verifying_key()),
            Permissions::root(),
            Restrictions::full_client(),
        );
        let credential = CredentialBuilder::client(identity.clone())
            .for_agent(&agent)
            .sign(host.anchor())
            .expect("credential should sign");
        Self { credential, key }
    }

    fn sign(&self, method: Method) -> Method {
        method
            .with_credential(self.credential.clone())
            .sign(self.key.signing_key())
            .expect("method should sign")
    }
}

fn host_with(identities: &[&str]) -> (Arc<Host>, Vec<Entity>) {
    let anchor = HostAnchor::new(HostIdentifier::new("example.org").unwrap());
    let keyring = Arc::new(HostKeyring::new());
    keyring.insert(anchor.to_document()).unwrap();
    let directory = Arc::new(Directory::new());
    let entities = identities
        .iter()
        .map(|address| {
            let address = InternalIdentifier::new(*address).unwrap();
            Entity::Account(Account {
                host: address.host(),
                identity: directory.register(address).unwrap(),
            })
        })
        .collect();
    let host = Host::new(
        anchor,
        HostServices::in_memory(directory, keyring),
        &FederationConfig::default(),
    );
    (Arc::new(host), entities)
}

#[test]
fn stress_parallel_actions_one_entity_gap_free() {
    let (host, entities) = host_with(&["alice@example.org"]);
    let alice = Arc::new(entities[0].clone());
    let signer = Arc::new(Signer::new(&host, &alice.identity().address));

    let mut handles = Vec::new();
    for thread_id in 0..8 {
        let host = Arc::clone(&host);
        let alice = Arc::clone(&alice);
        let signer = Arc::clone(&signer);
        handles.push(thread::spawn(move || {
            let mut sequences = Vec::new();
            for i in 0..25 {
                let key = format!("t{thread_id}-{i}");
                let method = signer.sign(
                    modify_map(&alice, "settings", &key, None, Some(json!(i))).unwrap(),
                );
                let executed = host.execute(&method).expect("distinct keys never conflict");
                sequences.push(executed.audit_sequence.unwrap());
            }
            sequences
        }));
    }

    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();
    assert_eq!(all, (1..=200).collect::<Vec<u64>>());
    assert_eq!(host.audit().last_sequence(&alice.key()).unwrap(), 200);

    let stored = host
        .audit()
        .store()
        .read_since(&alice.key(), 0, 1_000)
        .unwrap();
    for (i, entry) in stored.iter().enumerate() {
        assert_eq!(entry.sequence, i as u64 + 1);
    }
}

#[test]
fn stress_concurrent_stale_writes_one_wins() {
    for _ in 0..20 {
        let (host, entities) = host_with(&["alice@example.org"]);
        let alice = entities[0].clone();
        let signer = Signer::new(&host, &alice.identity().address);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = ["A", "B"]
            .into_iter()
            .map(|value| {
                let method = signer.sign(
                    replace_value(&alice, "attribute.name", None, Some(json!(value))).unwrap(),
                );
                let host = Arc::clone(&host);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    host.execute(&method)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let wins = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(FederationError::Conflict(_))))
            .count();
        assert_eq!((wins, conflicts), (1, 1));
        assert_eq!(host.audit().last_sequence(&alice.key()).unwrap(), 1);
    }
}

#[test]
fn stress_parallel_entities_independent_sequences() {
    let names: Vec<String> = (0..10).map(|i| format!("user{i}@example.org")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let (host, entities) = host_with(&refs);

    let handles: Vec<_> = entities
        .into_iter()
        .map(|entity| {
            let host = Arc::clone(&host);
            thread::spawn(move || {
                let signer = Signer::new(&host, &entity.identity().address);
                let mut previous = None;
                for i in 0..30 {
                    let method = signer.sign(
                        replace_value(&entity, "attribute.name", previous.clone(), Some(json!(i)))
                            .unwrap(),
                    );
                    host.execute(&method).expect("sequential writes succeed");
                    previous = Some(json!(i));
                }
                entity.key()
            })
        })
        .collect();

    let keys: Vec<EntityKey> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for key in keys {
        assert_eq!(host.audit().last_sequence(&key).unwrap(), 30);
    }
}
