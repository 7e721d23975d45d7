//! AgenticFederation: a federated identity method/reply engine.
//!
//! Hosts hold identities, clients act for them through agents holding
//! signed credentials, and every change is an audited action. Actions on
//! another host travel through reliable, retrying push delivery.

pub mod audit;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod identity;
pub mod method;
pub mod property;
pub mod push;
pub mod storage;
pub mod time;

// Re-export primary types
pub use config::{AuditConfig, CredentialConfig, FederationConfig, PushConfig};
pub use dispatch::{Dispatched, Dispatcher};
pub use error::{AuthorizationError, FederationError, Result};
pub use host::{Executed, Host, HostServices};

// Identity and authorization
pub use auth::{
    Access, AuthorizationVerification, Authorizer, Credential, CredentialBuilder, CredentialKind,
    CredentialVerifier, Permissions, Requirements, Restrictions, RevocationList,
};
pub use identity::{
    Account, Agent, AgentId, Directory, Entity, EntityKey, HostAnchor, HostDocument,
    HostIdentifier, HostKeyring, Identity, IdentifierResolver, InternalIdentifier, Role,
};

// Methods, audit and properties
pub use audit::{AuditEntry, AuditLog, AuditPage, AuditStore, Replica};
pub use method::{
    create_method, ActionId, Method, MethodHandler, MethodKind, MethodRegistry, MethodScope,
    MethodType, Reply, ReplyOutcome,
};
pub use property::{PropertyCatalog, PropertyStore};

// Push delivery
pub use push::{
    DeliveryToken, FailureId, FailureRecord, FailureStore, PushService, PushState, Transport,
};
