//! Federation configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. Configuration is passed explicitly to `Host`,
//! `Dispatcher` and `PushService`; nothing is read from process-wide state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FederationError, Result};
use crate::push::Backoff;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationConfig {
    pub push: PushConfig,
    pub audit: AuditConfig,
    pub credential: CredentialConfig,
}

/// Push delivery retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Attempts before a transiently failing delivery gives up.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Where failure records are written; in memory when unset.
    pub failure_dir: Option<PathBuf>,
    /// Finished deliveries whose terminal state stays queryable.
    pub finished_retention: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 60_000,
            failure_dir: None,
            finished_retention: 1024,
        }
    }
}

impl PushConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Entries fetched per store read, and the most one `audit.read` returns.
    pub read_page_limit: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            read_page_limit: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Tolerated clock difference when checking expiry.
    pub clock_skew_ms: u64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            clock_skew_ms: 30_000,
        }
    }
}

impl CredentialConfig {
    pub fn clock_skew_micros(&self) -> u64 {
        self.clock_skew_ms.saturating_mul(1_000)
    }
}

impl FederationConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| FederationError::InvalidFileFormat(format!("config: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| match e {
            FederationError::InvalidFileFormat(msg) => {
                FederationError::InvalidFileFormat(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| FederationError::SerializationError(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }
}
