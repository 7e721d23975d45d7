//! Wire format for methods, replies and frames.
//!
//! Methods and replies are bincode envelopes behind a one-byte version
//! tag. Frames number each message on a connection; a reply frame carries
//! the number of the request frame it answers.

use serde::{Deserialize, Serialize};

use crate::error::{FederationError, Result};

use super::registry::MethodRegistry;
use super::reply::Reply;
use super::types::Method;

/// Current wire version.
pub const WIRE_VERSION: u8 = 1;

fn to_wire<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let body =
        bincode::serialize(value).map_err(|e| FederationError::SerializationError(e.to_string()))?;
    let mut bytes = Vec::with_capacity(body.len() + 1);
    bytes.push(WIRE_VERSION);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

fn from_wire<T: for<'de> Deserialize<'de>>(bytes: &[u8], what: &str) -> Result<T> {
    match bytes.split_first() {
        Some((&WIRE_VERSION, body)) => bincode::deserialize(body)
            .map_err(|e| FederationError::Decoding(format!("{what}: {e}"))),
        Some((version, _)) => Err(FederationError::Decoding(format!(
            "{what}: unsupported wire version {version}"
        ))),
        None => Err(FederationError::Decoding(format!("{what}: empty input"))),
    }
}

/// Serialize a method to bytes.
pub fn encode(method: &Method) -> Result<Vec<u8>> {
    to_wire(method)
}

/// Deserialize a method without consulting any handler.
///
/// Only the envelope structure is checked; use [`decode`] on receipt.
pub fn decode_envelope(bytes: &[u8]) -> Result<Method> {
    from_wire(bytes, "method")
}

/// Deserialize a method and check it is one the registry can execute.
///
/// Fails with `Decoding` for structural violations, including a payload
/// the handler does not accept, and `UnknownType` for an unregistered tag.
pub fn decode(bytes: &[u8], registry: &MethodRegistry) -> Result<Method> {
    let method = decode_envelope(bytes)?;
    method
        .check_invariants()
        .map_err(|e| FederationError::Decoding(e.to_string()))?;
    let handler = registry.get(&method.method_type)?;
    if handler.kind() != method.kind {
        return Err(FederationError::Decoding(format!(
            "{} is not a {:?}",
            method.method_type, method.kind
        )));
    }
    handler.validate(&method)?;
    Ok(method)
}

pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>> {
    to_wire(reply)
}

pub fn decode_reply(bytes: &[u8]) -> Result<Reply> {
    from_wire(bytes, "reply")
}

/// One numbered message on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub number: u64,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(number: u64, body: Vec<u8>) -> Self {
        Self { number, body }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        to_wire(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        from_wire(bytes, "frame")
    }
}
