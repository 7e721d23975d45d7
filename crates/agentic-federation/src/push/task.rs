//! Push tasks, their states and the retry backoff.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::identity::HostIdentifier;
use crate::method::Method;

/// Handle to a submitted external action.
///
/// Format: `apush_` + base58 of first 16 bytes of SHA-256(nonce, time).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryToken(pub String);

impl DeliveryToken {
    pub fn generate() -> Self {
        let nonce = crate::crypto::random::random_nonce_32();
        let input = format!("push:{}:{}", hex::encode(nonce), crate::time::now_micros());
        let hash = Sha256::digest(input.as_bytes());
        Self(format!("apush_{}", bs58::encode(&hash[..16]).into_string()))
    }
}

impl fmt::Display for DeliveryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a push task.
///
/// `Pending → Sending → {Delivered | Retrying → Sending | PermanentlyFailed
/// | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushState {
    Pending,
    Sending,
    Retrying,
    Delivered,
    PermanentlyFailed,
    Cancelled,
}

impl PushState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Delivered | Self::PermanentlyFailed | Self::Cancelled
        )
    }
}

impl fmt::Display for PushState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Retrying => "retrying",
            Self::Delivered => "delivered",
            Self::PermanentlyFailed => "permanently-failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One delivery in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTask {
    pub token: DeliveryToken,
    pub action: Method,
    pub recipient: HostIdentifier,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Microsecond timestamp of the next attempt while `Retrying`.
    pub next_retry_at: Option<u64>,
    pub state: PushState,
    pub created_at: u64,
}

impl PushTask {
    pub fn new(token: DeliveryToken, action: Method) -> Self {
        Self {
            token,
            recipient: action.recipient.clone(),
            action,
            attempts: 0,
            last_error: None,
            next_retry_at: None,
            state: PushState::Pending,
            created_at: crate::time::now_micros(),
        }
    }
}

/// Why a delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Network trouble or a busy host; try again later.
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// The recipient will never accept this action as sent.
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}
