//! Stress test: record 1000 actions for one identity, page through the
//! audit log, replay it into a replica, and ensure it completes in
//! reasonable time.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;

use agentic_federation::audit::read_audit;
use agentic_federation::crypto::keys::Ed25519KeyPair;
use agentic_federation::crypto::signing::public_key_to_base64;
use agentic_federation::property::{replace_value, MemoryPropertyStore, PropertySlot, PropertyTableId};
use agentic_federation::{
    Account, Agent, AuditEntry, AuditPage, CredentialBuilder, Directory, Entity, FederationConfig, Host,
    HostAnchor, HostIdentifier, HostKeyring, HostServices, InternalIdentifier, Permissions,
    PropertyStore, Replica, Restrictions,
};

const ACTIONS: u64 = 1000;
const PAGE: usize = 64;

#[test]
fn stress_audit_log_1000() {
    let anchor = HostAnchor::new(HostIdentifier::new("example.org").unwrap());
    let keyring = Arc::new(HostKeyring::new());
    keyring.insert(anchor.to_document()).unwrap();
    let directory = Arc::new(Directory::new());
    let address = InternalIdentifier::new("alice@example.org").unwrap();
    let alice = Entity::Account(Account {
        host: address.host(),
        identity: directory.register(address.clone()).unwrap(),
    });

    let mut config = FederationConfig::default();
    config.audit.read_page_limit = PAGE;
    let services = HostServices::in_memory(directory, keyring);
    let registry = services.registry.clone();
    let host = Host::new(anchor, services, &config);

    let key = Ed25519KeyPair::generate();
    let agent = Agent::new(
        address.clone(),
        public_key_to_base64(key.verifying_key()),
        Permissions::root(),
        Restrictions::full_client(),
    );
    let credential = CredentialBuilder::client(address.clone())
        .for_agent(&agent)
        .sign(host.anchor())
        .expect("credential should sign");

    let start = Instant::now();
    let mut previous = None;
    for i in 0..ACTIONS {
        let method = replace_value(&alice, "attribute.name", previous.clone(), Some(json!(i)))
            .unwrap()
            .with_credential(credential.clone())
            .sign(key.signing_key())
            .unwrap();
        let executed = host
            .execute(&method)
            .unwrap_or_else(|e| panic!("action {i} should execute: {e}"));
        assert_eq!(executed.audit_sequence, Some(i + 1));
        previous = Some(json!(i));
    }
    let record_elapsed = start.elapsed();

    // The lazy reader walks every page.
    let read_start = Instant::now();
    let entries: Vec<AuditEntry> = host
        .audit()
        .read_entries(&alice.key(), 0, &credential, host.authorizer())
        .collect::<Result<_, _>>()
        .expect("reading the log should succeed");
    assert_eq!(entries.len() as u64, ACTIONS);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.sequence, i as u64 + 1, "entry {i} out of order");
    }

    // One audit.read returns at most a page.
    let query = read_audit(&alice, 100, None)
        .unwrap()
        .with_credential(credential.clone())
        .sign(key.signing_key())
        .unwrap();
    let page: AuditPage =
        serde_json::from_slice(&host.execute(&query).unwrap().content).unwrap();
    assert_eq!(page.entries.len(), PAGE);
    assert_eq!(page.entries[0].sequence, 101);
    assert_eq!(page.through, 100 + PAGE as u64);
    let read_elapsed = read_start.elapsed();

    let replay_start = Instant::now();
    let mut replica = Replica::new(alice.key(), Arc::new(MemoryPropertyStore::new()), registry);
    assert_eq!(replica.apply(entries).unwrap() as u64, ACTIONS);
    let slot = PropertySlot::value(PropertyTableId::new("attribute.name"), address);
    assert_eq!(
        replica.properties().get(&slot).unwrap(),
        Some(json!(ACTIONS - 1))
    );
    let replay_elapsed = replay_start.elapsed();

    let total_elapsed = start.elapsed();
    assert!(
        total_elapsed.as_secs() < 60,
        "1000-entry audit log should complete in under 60 seconds, took {:?}",
        total_elapsed
    );

    eprintln!(
        "Audit log stress test: record={:?}, read={:?}, replay={:?}, total={:?}",
        record_elapsed, read_elapsed, replay_elapsed, total_elapsed
    );
}
