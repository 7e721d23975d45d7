//! Permission names, access levels and wildcard matching.
//!
//! Permissions map a capability name to an access level. Names use
//! the `kind:resource` scheme with wildcards:
//!   - `attribute:name`: the name attribute specifically
//!   - `attribute:*`: any attribute
//!   - `property/contacts/*`: anything under the contacts path
//!   - `*`: everything (the identity's own root agent)
//!
//! `Write` access implies `Read`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Access level granted for a permission name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Access {
    Read,
    Write,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Check whether a granted name covers a requested name.
pub fn permission_name_covers(granted: &str, requested: &str) -> bool {
    if granted == "*" || granted == requested {
        return true;
    }

    for (suffix, sep) in [(":*", b':'), ("/*", b'/')] {
        if let Some(prefix) = granted.strip_suffix(suffix) {
            if requested == prefix {
                return true;
            }
            if requested.starts_with(prefix) && requested.as_bytes().get(prefix.len()) == Some(&sep)
            {
                return true;
            }
        }
    }

    false
}

/// A set of named permissions with their access levels.
///
/// Backed by a `BTreeMap` so that serialized forms (and therefore
/// signatures over them) are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions(BTreeMap<String, Access>);

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every permission, with write access.
    pub fn root() -> Self {
        Self::new().with("*", Access::Write)
    }

    /// Add (or upgrade) a permission, builder style.
    pub fn with(mut self, name: impl Into<String>, access: Access) -> Self {
        self.grant(name, access);
        self
    }

    pub fn read(name: impl Into<String>) -> Self {
        Self::new().with(name, Access::Read)
    }

    pub fn write(name: impl Into<String>) -> Self {
        Self::new().with(name, Access::Write)
    }

    /// Grant a permission. An existing higher level is kept.
    pub fn grant(&mut self, name: impl Into<String>, access: Access) {
        let entry = self.0.entry(name.into()).or_insert(access);
        if access > *entry {
            *entry = access;
        }
    }

    /// Highest access these permissions give for `name`, if any.
    pub fn access_for(&self, name: &str) -> Option<Access> {
        self.0
            .iter()
            .filter(|(granted, _)| permission_name_covers(granted, name))
            .map(|(_, access)| *access)
            .max()
    }

    /// Check whether `name` is covered at `access` or above.
    pub fn covers(&self, name: &str, access: Access) -> bool {
        self.access_for(name).is_some_and(|a| a >= access)
    }

    /// Check that every required permission is covered.
    ///
    /// Returns the first missing permission as `name (access)`.
    pub fn covers_all(&self, required: &Permissions) -> std::result::Result<(), String> {
        match required.iter().find(|(name, access)| !self.covers(name, *access)) {
            Some((name, access)) => Err(format!("{name} ({})", access.as_str())),
            None => Ok(()),
        }
    }

    /// Narrow these permissions to what `ceiling` allows.
    ///
    /// The result never grants more than either side, so refining an
    /// agent repeatedly can only shrink what it holds.
    pub fn restrict_to(&self, ceiling: &Permissions) -> Permissions {
        let mut out = Permissions::new();
        for (name, access) in self.iter() {
            if let Some(limit) = ceiling.access_for(name) {
                out.grant(name, access.min(limit));
            }
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Access)> {
        self.0.iter().map(|(n, a)| (n.as_str(), *a))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}
