//! Identity model: identifiers, entities, agents and host keys.
//!
//! This is the leaf of the crate: every other module addresses state
//! through these types.

pub mod agent;
pub mod anchor;
pub mod entity;
pub mod identifier;
pub mod resolver;

pub use agent::{Agent, AgentId};
pub use anchor::{HostAnchor, HostDocument, HostKeyring};
pub use entity::{Account, Entity, EntityKey, Identity, Role};
pub use identifier::{HostIdentifier, InternalIdentifier};
pub use resolver::{CachingResolver, Directory, IdentifierResolver};
