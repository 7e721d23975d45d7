//! Restrictions: structural constraints on what an agent may do.
//!
//! Where permissions name *what* an agent may touch, restrictions describe
//! *who* the agent is allowed to be:
//! - `client`: the agent acts for a client (not a host)
//! - `role`: the agent may assume roles of the identity
//! - `writing`: the agent may change permissions and agents
//! - `context`: the agent is confined to a context subtree (`None` = all)

use serde::{Deserialize, Serialize};

/// Restrictions held by an agent, or required by a method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restrictions {
    pub client: bool,
    pub role: bool,
    pub writing: bool,
    pub context: Option<String>,
}

fn context_covers(held: Option<&str>, required: &str) -> bool {
    match held {
        None => true,
        Some(held) => {
            required == held
                || (required.starts_with(held) && required.as_bytes().get(held.len()) == Some(&b'/'))
        }
    }
}

impl Restrictions {
    /// No structural requirement at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Everything a fully trusted client agent holds.
    pub fn full_client() -> Self {
        Self {
            client: true,
            role: true,
            writing: true,
            context: None,
        }
    }

    /// Require (or hold) the client flag, builder style.
    pub fn client(mut self) -> Self {
        self.client = true;
        self
    }

    pub fn role(mut self) -> Self {
        self.role = true;
        self
    }

    pub fn writing(mut self) -> Self {
        self.writing = true;
        self
    }

    pub fn in_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Check that these (held) restrictions satisfy `required`.
    ///
    /// Returns a description of the first unmet requirement.
    pub fn covers(&self, required: &Restrictions) -> std::result::Result<(), String> {
        if required.client && !self.client {
            return Err("must be a client agent".into());
        }
        if required.role && !self.role {
            return Err("agent may not assume roles".into());
        }
        if required.writing && !self.writing {
            return Err("agent may not write".into());
        }
        if let Some(ctx) = &required.context {
            if !context_covers(self.context.as_deref(), ctx) {
                return Err(format!("agent is not allowed in context {ctx}"));
            }
        }
        Ok(())
    }

    /// Narrow these restrictions to what `ceiling` allows.
    pub fn restrict_to(&self, ceiling: &Restrictions) -> Restrictions {
        let context = match (&self.context, &ceiling.context) {
            (_, None) => self.context.clone(),
            (None, Some(c)) => Some(c.clone()),
            (Some(own), Some(c)) if context_covers(Some(c), own) => Some(own.clone()),
            (Some(_), Some(c)) => Some(c.clone()),
        };
        Restrictions {
            client: self.client && ceiling.client,
            role: self.role && ceiling.role,
            writing: self.writing && ceiling.writing,
            context,
        }
    }
}
