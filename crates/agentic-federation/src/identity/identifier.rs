//! Host and internal identifiers.
//!
//! Identifiers are validated once at construction and immutable after:
//! - `HostIdentifier`: a dotted host name, e.g. `example.org`
//! - `InternalIdentifier`: `local@host`, e.g. `alice@example.org`
//!
//! Validity is purely syntactic. Whether an identifier names an existing
//! identity is a separate question answered by an `IdentifierResolver`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FederationError, Result};

const MAX_HOST_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;
const MAX_LOCAL_LEN: usize = 64;

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Identifier of a host, e.g. `example.org`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostIdentifier(String);

impl HostIdentifier {
    /// Validate and construct a host identifier.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if Self::is_valid(&value) {
            Ok(Self(value))
        } else {
            Err(FederationError::InvalidIdentifier(format!(
                "not a host identifier: {value:?}"
            )))
        }
    }

    /// Pure syntactic predicate: at least two lowercase DNS labels.
    pub fn is_valid(value: &str) -> bool {
        if value.is_empty() || value.len() > MAX_HOST_LEN {
            return false;
        }
        let labels: Vec<&str> = value.split('.').collect();
        labels.len() >= 2 && labels.iter().all(|l| is_valid_label(l))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HostIdentifier {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for HostIdentifier {
    type Error = FederationError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<HostIdentifier> for String {
    fn from(id: HostIdentifier) -> Self {
        id.0
    }
}

/// Identifier of an identity held by a host, e.g. `alice@example.org`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InternalIdentifier {
    value: String,
    at: usize,
}

impl InternalIdentifier {
    /// Validate and construct an internal identifier.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        match Self::split(&value) {
            Some(at) => Ok(Self { value, at }),
            None => Err(FederationError::InvalidIdentifier(format!(
                "not an internal identifier: {value:?}"
            ))),
        }
    }

    /// Build `local@host` from parts.
    pub fn from_parts(local: &str, host: &HostIdentifier) -> Result<Self> {
        Self::new(format!("{local}@{host}"))
    }

    /// Pure syntactic predicate.
    pub fn is_valid(value: &str) -> bool {
        Self::split(value).is_some()
    }

    fn split(value: &str) -> Option<usize> {
        let at = value.find('@')?;
        let (local, host) = (&value[..at], &value[at + 1..]);
        let local_ok = !local.is_empty()
            && local.len() <= MAX_LOCAL_LEN
            && !local.starts_with('.')
            && local.bytes().all(|b| {
                b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-')
            });
        (local_ok && HostIdentifier::is_valid(host)).then_some(at)
    }

    /// The part before `@`.
    pub fn local(&self) -> &str {
        &self.value[..self.at]
    }

    /// The host holding this identity.
    pub fn host(&self) -> HostIdentifier {
        HostIdentifier(self.value[self.at + 1..].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for InternalIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl FromStr for InternalIdentifier {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for InternalIdentifier {
    type Error = FederationError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<InternalIdentifier> for String {
    fn from(id: InternalIdentifier) -> Self {
        id.value
    }
}
