//! The transport boundary between hosts.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::host::Host;
use crate::identity::HostIdentifier;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The frame may not have arrived; sending again is safe.
    #[error("network error: {0}")]
    Network(String),

    /// No route to the recipient host.
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),
}

/// Carries an encoded frame to a host and returns its encoded reply frame.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, recipient: &HostIdentifier, frame: Vec<u8>)
        -> Result<Vec<u8>, TransportError>;
}

/// In-process transport delivering frames straight to local hosts.
#[derive(Default)]
pub struct LoopbackTransport {
    hosts: RwLock<HashMap<HostIdentifier, Arc<Host>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, host: Arc<Host>) {
        if let Ok(mut hosts) = self.hosts.write() {
            hosts.insert(host.identifier().clone(), host);
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(
        &self,
        recipient: &HostIdentifier,
        frame: Vec<u8>,
    ) -> Result<Vec<u8>, TransportError> {
        let host = self
            .hosts
            .read()
            .map_err(|_| TransportError::Network("loopback routing table poisoned".into()))?
            .get(recipient)
            .cloned()
            .ok_or_else(|| TransportError::UnknownRecipient(recipient.to_string()))?;
        host.handle_frame(&frame)
            .map_err(|e| TransportError::Network(e.to_string()))
    }
}
