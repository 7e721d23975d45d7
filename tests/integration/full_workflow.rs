//! End-to-end workflow on a single host.
//!
//! A client role mutates properties of its identity through the
//! dispatcher, reads the audit log back, replays it into a local replica
//! and finally loses access when its agent is revoked.

use std::sync::Arc;

use serde_json::json;

use agentic_federation::audit::read_audit;
use agentic_federation::auth::{Revocation, RevocationReason};
use agentic_federation::crypto::keys::Ed25519KeyPair;
use agentic_federation::crypto::signing::public_key_to_base64;
use agentic_federation::identity::Role;
use agentic_federation::property::{
    modify_map, modify_set, replace_value, MemoryPropertyStore, PropertySlot, PropertyTableId,
    SetOperation,
};
use agentic_federation::{
    Agent, AuditEntry, AuditPage, AuthorizationError, CredentialBuilder, Directory, Dispatcher,
    Entity, FederationConfig, FederationError, Host, HostAnchor, HostIdentifier, HostKeyring,
    HostServices, InternalIdentifier, Method, MethodRegistry, PropertyStore, Replica,
    Restrictions,
};
use agentic_federation::{Permissions, RevocationList};

struct World {
    host: Arc<Host>,
    directory: Arc<Directory>,
    dispatcher: Dispatcher,
    revocations: Arc<RevocationList>,
    registry: Arc<MethodRegistry>,
}

fn world() -> (World, InternalIdentifier) {
    let anchor = HostAnchor::new(HostIdentifier::new("example.org").unwrap());
    let keyring = Arc::new(HostKeyring::new());
    keyring.insert(anchor.to_document()).unwrap();

    let directory = Arc::new(Directory::new());
    let alice = InternalIdentifier::new("alice@example.org").unwrap();
    directory.register(alice.clone()).unwrap();

    let config = FederationConfig::default();
    let services = HostServices::in_memory(directory.clone(), keyring.clone());
    let revocations = services.revocations.clone();
    let registry = services.registry.clone();
    let host = Arc::new(Host::new(anchor, services, &config));

    let mut dispatcher = Dispatcher::new(registry.clone(), keyring, revocations.clone(), &config);
    dispatcher.add_host(host.clone());
    (
        World {
            host,
            directory,
            dispatcher,
            revocations,
            registry,
        },
        alice,
    )
}

/// A client holding a role for `identity` through a fresh agent.
struct Client {
    role: Entity,
    key: Ed25519KeyPair,
}

impl Client {
    fn new(identity: &InternalIdentifier, permissions: Permissions) -> Self {
        let key = Ed25519KeyPair::generate();
        let agent = Agent::new(
            identity.clone(),
            public_key_to_base64(key.verifying_key()),
            permissions,
            Restrictions::full_client(),
        );
        let role = Entity::Role(Role {
            client: "laptop".into(),
            identity: Arc::new(agentic_federation::Identity::new(identity.clone())),
            agent,
        });
        Self { role, key }
    }

    fn agent(&self) -> &Agent {
        self.role.agent().unwrap()
    }

    fn sign(&self, world: &World, method: Method) -> Method {
        let credential = CredentialBuilder::client(self.agent().identity.clone())
            .for_agent(self.agent())
            .sign(world.host.anchor())
            .unwrap();
        method
            .with_credential(credential)
            .sign(self.key.signing_key())
            .unwrap()
    }

    fn read_page(&self, world: &World, since: u64) -> AuditPage {
        let query = self.sign(world, read_audit(&self.role, since, None).unwrap());
        let dispatched = world.dispatcher.dispatch(query).unwrap();
        dispatched.reply().unwrap().content_as().unwrap()
    }

    fn read_log(&self, world: &World, since: u64) -> Vec<AuditEntry> {
        self.read_page(world, since).entries
    }
}

#[test]
fn test_mutate_read_and_replicate() {
    let (world, alice) = world();
    let client = Client::new(&alice, Permissions::root());

    let actions = vec![
        replace_value(&client.role, "attribute.name", None, Some(json!("Alice"))).unwrap(),
        modify_set(&client.role, "contacts", json!("bob@other.org"), SetOperation::Add).unwrap(),
        modify_map(&client.role, "settings", "theme", None, Some(json!("dark"))).unwrap(),
        replace_value(
            &client.role,
            "attribute.name",
            Some(json!("Alice")),
            Some(json!("Alice L.")),
        )
        .unwrap(),
    ];
    for (i, action) in actions.into_iter().enumerate() {
        let reply = world.dispatcher.dispatch(client.sign(&world, action)).unwrap();
        assert_eq!(reply.reply().unwrap().audit_sequence(), Some(i as u64 + 1));
    }

    let entries = client.read_log(&world, 0);
    let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
    assert_eq!(client.read_log(&world, 2).len(), 2);

    let mut replica = Replica::new(
        client.role.key(),
        Arc::new(MemoryPropertyStore::new()),
        world.registry.clone(),
    );
    assert_eq!(replica.apply(entries.clone()).unwrap(), 4);
    assert_eq!(replica.apply(entries).unwrap(), 0);
    assert_eq!(replica.applied_sequence(), 4);

    let name = PropertySlot::value(PropertyTableId::new("attribute.name"), alice.clone());
    assert_eq!(
        replica.properties().get(&name).unwrap(),
        world.host.properties().get(&name).unwrap()
    );
    assert_eq!(replica.properties().get(&name).unwrap(), Some(json!("Alice L.")));

    let contacts = PropertyTableId::new("contacts");
    assert_eq!(
        replica.properties().elements(&contacts, &alice).unwrap(),
        world.host.properties().elements(&contacts, &alice).unwrap()
    );
}

#[test]
fn test_audit_visibility_follows_permissions() {
    let (world, alice) = world();
    let owner = Client::new(&alice, Permissions::root());
    for action in [
        replace_value(&owner.role, "attribute.name", None, Some(json!("Alice"))).unwrap(),
        modify_set(&owner.role, "contacts", json!("bob@other.org"), SetOperation::Add).unwrap(),
    ] {
        world.dispatcher.dispatch(owner.sign(&world, action)).unwrap();
    }

    let narrow = Client::new(&alice, Permissions::write("attribute:*"));
    let visible = narrow.read_log(&world, 0);
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].sequence, 1);
    assert_eq!(owner.read_log(&world, 0).len(), 2);
}

#[test]
fn test_reader_of_one_table_replicates_past_hidden_entries() {
    let (world, alice) = world();
    let owner = Client::new(&alice, Permissions::root());
    for action in [
        replace_value(&owner.role, "attribute.name", None, Some(json!("Alice"))).unwrap(),
        modify_set(&owner.role, "contacts", json!("bob@other.org"), SetOperation::Add).unwrap(),
    ] {
        world.dispatcher.dispatch(owner.sign(&world, action)).unwrap();
    }

    let reader = Client::new(&alice, Permissions::read("contact:list"));
    let page = reader.read_page(&world, 0);
    let sequences: Vec<u64> = page.entries.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![2]);
    assert_eq!(page.through, 2);

    let mut replica = Replica::new(
        reader.role.key(),
        Arc::new(MemoryPropertyStore::new()),
        world.registry.clone(),
    );
    assert_eq!(replica.apply_page(&page).unwrap(), 1);
    assert_eq!(replica.applied_sequence(), 2);

    let contacts = PropertyTableId::new("contacts");
    assert_eq!(
        replica.properties().elements(&contacts, &alice).unwrap(),
        world.host.properties().elements(&contacts, &alice).unwrap()
    );
    let name = PropertySlot::value(PropertyTableId::new("attribute.name"), alice.clone());
    assert_eq!(replica.properties().get(&name).unwrap(), None);

    // Later writes continue from where the page left off.
    world
        .dispatcher
        .dispatch(owner.sign(
            &world,
            modify_set(&owner.role, "contacts", json!("carol@other.org"), SetOperation::Add)
                .unwrap(),
        ))
        .unwrap();
    let next = reader.read_page(&world, replica.applied_sequence());
    assert_eq!(replica.apply_page(&next).unwrap(), 1);
    assert_eq!(replica.applied_sequence(), 3);
}

#[test]
fn test_credential_cannot_act_on_other_identity() {
    let (world, alice) = world();
    let bob = InternalIdentifier::new("bob@example.org").unwrap();
    world.directory.register(bob.clone()).unwrap();
    let owner = Client::new(&bob, Permissions::root());
    world
        .dispatcher
        .dispatch(owner.sign(
            &world,
            replace_value(&owner.role, "attribute.name", None, Some(json!("Bob"))).unwrap(),
        ))
        .unwrap();

    let intruder = Client::new(&alice, Permissions::write("attribute:*"));
    let overwrite = intruder.sign(
        &world,
        replace_value(&owner.role, "attribute.name", Some(json!("Bob")), Some(json!("pwned")))
            .unwrap(),
    );
    assert!(matches!(
        world.dispatcher.dispatch(overwrite.clone()).unwrap_err(),
        FederationError::Authorization(AuthorizationError::WrongSubject { .. })
    ));
    assert!(matches!(
        world.host.execute(&overwrite).unwrap_err(),
        FederationError::Authorization(AuthorizationError::WrongSubject { .. })
    ));

    let snoop = intruder.sign(&world, read_audit(&owner.role, 0, None).unwrap());
    assert!(matches!(
        world.host.execute(&snoop).unwrap_err(),
        FederationError::Authorization(AuthorizationError::WrongSubject { .. })
    ));

    let name = PropertySlot::value(PropertyTableId::new("attribute.name"), bob);
    assert_eq!(world.host.properties().get(&name).unwrap(), Some(json!("Bob")));
    assert_eq!(world.host.audit().last_sequence(&owner.role.key()).unwrap(), 1);
}

#[test]
fn test_revoked_agent_loses_access() {
    let (world, alice) = world();
    let client = Client::new(&alice, Permissions::write("attribute:*"));
    let first = client.sign(
        &world,
        replace_value(&client.role, "attribute.name", None, Some(json!("Alice"))).unwrap(),
    );
    world.dispatcher.dispatch(first).unwrap();

    world
        .revocations
        .revoke(Revocation::create(
            client.agent().id.clone(),
            RevocationReason::Compromised,
            world.host.anchor(),
        ))
        .unwrap();

    let second = client.sign(
        &world,
        replace_value(
            &client.role,
            "attribute.name",
            Some(json!("Alice")),
            Some(json!("Mallory")),
        )
        .unwrap(),
    );
    // Rejected on the issuing side already; the host would agree.
    assert!(matches!(
        world.dispatcher.dispatch(second.clone()).unwrap_err(),
        FederationError::Authorization(AuthorizationError::RevokedCredential)
    ));
    assert!(matches!(
        world.host.execute(&second).unwrap_err(),
        FederationError::Authorization(AuthorizationError::RevokedCredential)
    ));
    assert_eq!(world.host.audit().last_sequence(&client.role.key()).unwrap(), 1);

    // A locally revoked agent is not issued a fresh credential either.
    let mut agent = client.agent().clone();
    agent.revoke();
    assert!(matches!(
        CredentialBuilder::client(alice).for_agent(&agent).sign(world.host.anchor()),
        Err(FederationError::Authorization(AuthorizationError::RevokedCredential))
    ));
}

#[test]
fn test_stale_write_conflicts_and_leaves_log_untouched() {
    let (world, alice) = world();
    let client = Client::new(&alice, Permissions::write("settings"));
    let set = |old: Option<serde_json::Value>, new: &str| {
        client.sign(
            &world,
            modify_map(&client.role, "settings", "theme", old, Some(json!(new))).unwrap(),
        )
    };
    world.dispatcher.dispatch(set(None, "dark")).unwrap();
    assert!(matches!(
        world.dispatcher.dispatch(set(None, "light")).unwrap_err(),
        FederationError::Conflict(_)
    ));
    world
        .dispatcher
        .dispatch(set(Some(json!("dark")), "light"))
        .unwrap();
    assert_eq!(world.host.audit().last_sequence(&client.role.key()).unwrap(), 2);
}
