//! Edge case tests: envelope invariants, decoding, signatures, anonymous
//! credentials, expiry, and property edits that must not commit.

use std::sync::Arc;

use serde_json::json;

use agentic_federation::auth::AnonymousSecrets;
use agentic_federation::crypto::keys::Ed25519KeyPair;
use agentic_federation::crypto::signing::public_key_to_base64;
use agentic_federation::method::{self, Frame};
use agentic_federation::property::{
    get_property, modify_set, replace_value, SetOperation, ValueReplace,
};
use agentic_federation::{
    create_method, Account, Agent, AuthorizationError, Credential, CredentialBuilder, Directory,
    Entity, FederationConfig, FederationError, Host, HostAnchor, HostIdentifier, HostKeyring,
    HostServices, Identity, InternalIdentifier, Method, MethodKind, MethodScope, MethodType,
    Permissions, Requirements, Restrictions,
};

struct Setup {
    host: Host,
    directory: Arc<Directory>,
    alice: Entity,
    agent: Agent,
    key: Ed25519KeyPair,
}

fn setup() -> Setup {
    let anchor = HostAnchor::new(HostIdentifier::new("example.org").unwrap());
    let keyring = Arc::new(HostKeyring::new());
    keyring.insert(anchor.to_document()).unwrap();
    let directory = Arc::new(Directory::new());
    let address = InternalIdentifier::new("alice@example.org").unwrap();
    let alice = Entity::Account(Account {
        host: address.host(),
        identity: directory.register(address.clone()).unwrap(),
    });
    let host = Host::new(
        anchor,
        HostServices::in_memory(directory.clone(), keyring),
        &FederationConfig::default(),
    );
    let key = Ed25519KeyPair::generate();
    let agent = Agent::new(
        address,
        public_key_to_base64(key.verifying_key()),
        Permissions::root(),
        Restrictions::full_client(),
    );
    Setup {
        host,
        directory,
        alice,
        agent,
        key,
    }
}

impl Setup {
    fn credential(&self) -> Credential {
        CredentialBuilder::client(self.agent.identity.clone())
            .for_agent(&self.agent)
            .sign(self.host.anchor())
            .unwrap()
    }

    fn sign(&self, method: Method) -> Method {
        method
            .with_credential(self.credential())
            .sign(self.key.signing_key())
            .unwrap()
    }

    fn entries(&self) -> u64 {
        self.host.audit().last_sequence(&self.alice.key()).unwrap()
    }
}

// === Envelope invariants ===

#[test]
fn edge_internal_method_for_foreign_subject_is_malformed() {
    let s = setup();
    let bob = InternalIdentifier::new("bob@other.org").unwrap();
    let result = create_method(
        MethodKind::Action,
        MethodScope::Internal,
        MethodType::new("property.value.replace"),
        Some(&s.alice),
        bob.clone(),
        bob.host(),
        Vec::new(),
    );
    assert!(matches!(result, Err(FederationError::MalformedMethod(_))));
}

#[test]
fn edge_external_method_with_wrong_recipient_is_malformed() {
    let s = setup();
    let bob = InternalIdentifier::new("bob@other.org").unwrap();
    let result = create_method(
        MethodKind::Action,
        MethodScope::External,
        MethodType::new("access.request"),
        Some(&s.alice),
        bob,
        HostIdentifier::new("third.org").unwrap(),
        Vec::new(),
    );
    assert!(matches!(result, Err(FederationError::MalformedMethod(_))));
}

// === Decoding ===

#[test]
fn edge_decode_garbage_and_unknown_versions() {
    let s = setup();
    let registry = s.host.registry();
    assert!(matches!(
        method::decode(&[], registry),
        Err(FederationError::Decoding(_))
    ));
    assert!(matches!(
        method::decode(&[1, 0xff, 0xff, 0xff], registry),
        Err(FederationError::Decoding(_))
    ));

    let good = method::encode(&s.sign(
        replace_value(&s.alice, "attribute.name", None, Some(json!("A"))).unwrap(),
    ))
    .unwrap();
    let mut future = good.clone();
    future[0] = method::WIRE_VERSION + 1;
    assert!(matches!(
        method::decode(&future, registry),
        Err(FederationError::Decoding(_))
    ));
    assert!(method::decode(&good, registry).is_ok());
}

#[test]
fn edge_decode_unknown_type_tag() {
    let s = setup();
    let subject = s.alice.identity().address.clone();
    let unknown = create_method(
        MethodKind::Action,
        MethodScope::Internal,
        MethodType::new("calendar.event.create"),
        Some(&s.alice),
        subject.clone(),
        subject.host(),
        b"{}".to_vec(),
    )
    .unwrap();
    let bytes = method::encode(&unknown).unwrap();
    assert!(matches!(
        method::decode(&bytes, s.host.registry()),
        Err(FederationError::UnknownType(_))
    ));
}

#[test]
fn edge_payload_with_unknown_fields_rejected() {
    let s = setup();
    let mut m = replace_value(&s.alice, "attribute.name", None, Some(json!("A"))).unwrap();
    m.payload = serde_json::to_vec(&json!({
        "table": "attribute.name",
        "old": null,
        "new": "A",
        "extra": true,
    }))
    .unwrap();
    assert!(matches!(
        s.host.execute(&s.sign(m)).unwrap_err(),
        FederationError::Decoding(_)
    ));
}

#[test]
fn edge_undeclared_table_rejected() {
    let s = setup();
    let m = s.sign(replace_value(&s.alice, "attribute.shoe_size", None, Some(json!(42))).unwrap());
    assert!(matches!(
        s.host.execute(&m).unwrap_err(),
        FederationError::Decoding(_)
    ));
    assert_eq!(s.entries(), 0);
}

// === Signatures and credentials ===

#[test]
fn edge_tampered_payload_after_signing() {
    let s = setup();
    let mut m = s.sign(replace_value(&s.alice, "attribute.name", None, Some(json!("A"))).unwrap());
    m.payload = serde_json::to_vec(&ValueReplace {
        table: agentic_federation::property::PropertyTableId::new("attribute.name"),
        old: None,
        new: Some(json!("Mallory")),
    })
    .unwrap();
    assert!(matches!(
        s.host.execute(&m).unwrap_err(),
        FederationError::SignatureInvalid
    ));
    assert_eq!(s.entries(), 0);
}

#[test]
fn edge_credential_without_signature() {
    let s = setup();
    let m = replace_value(&s.alice, "attribute.name", None, Some(json!("A")))
        .unwrap()
        .with_credential(s.credential());
    assert!(matches!(
        s.host.execute(&m).unwrap_err(),
        FederationError::SignatureInvalid
    ));
}

#[test]
fn edge_action_without_credential() {
    let s = setup();
    let m = replace_value(&s.alice, "attribute.name", None, Some(json!("A"))).unwrap();
    assert!(matches!(
        s.host.execute(&m).unwrap_err(),
        FederationError::Authorization(AuthorizationError::MissingCredential)
    ));
}

#[test]
fn edge_expired_credential_is_not_current() {
    let s = setup();
    let credential = s.credential();
    let later = credential.expires_at + 2 * 3_600 * 1_000_000;
    let verdict = s
        .host
        .authorizer()
        .evaluate_at(&Requirements::none(), &credential, later);
    assert!(!verdict.credential_current);
    assert_eq!(
        verdict.first_failure,
        Some(AuthorizationError::RevokedCredential)
    );
}

#[test]
fn edge_anonymous_credential_proof_must_target_verifier() {
    let s = setup();
    let secrets = AnonymousSecrets::generate();
    let anonymous = CredentialBuilder::anonymous(&secrets)
        .for_agent(&s.agent)
        .sign(s.host.anchor())
        .unwrap();

    let elsewhere = HostAnchor::new(HostIdentifier::new("verifier.org").unwrap());
    let misdirected = anonymous
        .clone()
        .with_proof(secrets.prove_to(&elsewhere.to_document().encryption_public_key()).unwrap());
    let m = replace_value(&s.alice, "attribute.name", None, Some(json!("A")))
        .unwrap()
        .with_credential(misdirected)
        .sign(s.key.signing_key())
        .unwrap();
    assert!(matches!(
        s.host.execute(&m).unwrap_err(),
        FederationError::VerifiableEncryptionMismatch(_)
    ));

    let proper = anonymous
        .with_proof(secrets.prove_to(&s.host.document().encryption_public_key()).unwrap());
    let m = replace_value(&s.alice, "attribute.name", None, Some(json!("A")))
        .unwrap()
        .with_credential(proper)
        .sign(s.key.signing_key())
        .unwrap();
    // Until alice registers the commitment the credential acts for nobody.
    assert!(matches!(
        s.host.execute(&m).unwrap_err(),
        FederationError::Authorization(AuthorizationError::WrongSubject { .. })
    ));
    assert_eq!(s.entries(), 0);

    s.directory
        .register_commitment(&s.alice.identity().address, secrets.commitment())
        .unwrap();
    assert_eq!(s.host.execute(&m).unwrap().audit_sequence, Some(1));
}

#[test]
fn edge_anonymous_credential_without_proof_rejected() {
    let s = setup();
    let secrets = AnonymousSecrets::generate();
    s.directory
        .register_commitment(&s.alice.identity().address, secrets.commitment())
        .unwrap();
    let bare = CredentialBuilder::anonymous(&secrets)
        .for_agent(&s.agent)
        .sign(s.host.anchor())
        .unwrap();
    let m = replace_value(&s.alice, "attribute.name", None, Some(json!("A")))
        .unwrap()
        .with_credential(bare)
        .sign(s.key.signing_key())
        .unwrap();
    assert!(matches!(
        s.host.execute(&m).unwrap_err(),
        FederationError::VerifiableEncryptionMismatch(_)
    ));
    assert_eq!(s.entries(), 0);
}

// === Queries and property edits ===

#[test]
fn edge_query_never_audited() {
    let s = setup();
    for _ in 0..5 {
        let q = s.sign(get_property(&s.alice, "attribute.name", None).unwrap());
        assert_eq!(s.host.execute(&q).unwrap().audit_sequence, None);
    }
    assert_eq!(s.entries(), 0);
}

#[test]
fn edge_removing_absent_set_element_conflicts() {
    let s = setup();
    let m = s.sign(
        modify_set(&s.alice, "contacts", json!("nobody@other.org"), SetOperation::Remove).unwrap(),
    );
    assert!(matches!(
        s.host.execute(&m).unwrap_err(),
        FederationError::Conflict(_)
    ));
    assert_eq!(s.entries(), 0);
}

#[test]
fn edge_subject_not_held_by_host() {
    let s = setup();
    let stranger = Entity::Account(Account {
        host: s.host.identifier().clone(),
        identity: Arc::new(Identity::new(
            InternalIdentifier::new("carol@example.org").unwrap(),
        )),
    });
    let m = s.sign(replace_value(&stranger, "attribute.name", None, Some(json!("C"))).unwrap());
    assert!(matches!(
        s.host.execute(&m).unwrap_err(),
        FederationError::NotFound(_)
    ));
}

#[test]
fn edge_frame_for_other_host_answered_with_rejection() {
    let s = setup();
    let elsewhere = Entity::Account(Account {
        host: HostIdentifier::new("other.org").unwrap(),
        identity: Arc::new(Identity::new(InternalIdentifier::new("bob@other.org").unwrap())),
    });
    let m = replace_value(&elsewhere, "attribute.name", None, Some(json!("B"))).unwrap();
    let request = Frame::new(3, method::encode(&m).unwrap()).encode().unwrap();
    let answer = Frame::decode(&s.host.handle_frame(&request).unwrap()).unwrap();
    let reply = method::decode_reply(&answer.body).unwrap();
    assert!(reply.correlates(3, &m.id));
    assert!(!reply.is_ok());
    assert!(matches!(
        reply.into_result().unwrap_err(),
        FederationError::UnknownRecipient(_)
    ));
}
