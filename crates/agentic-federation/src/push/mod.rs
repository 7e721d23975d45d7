//! Reliable push delivery of external actions.
//!
//! - `task`: task states, delivery errors and backoff
//! - `transport`: the host-to-host boundary
//! - `failure`: durable records of deliveries that gave up
//! - `service`: the retrying delivery workers

pub mod failure;
pub mod service;
pub mod task;
pub mod transport;

pub use failure::{FailureId, FailureRecord, FailureStore, MemoryFailureStore};
pub use service::PushService;
pub use task::{Backoff, DeliveryError, DeliveryToken, PushState, PushTask};
pub use transport::{LoopbackTransport, Transport, TransportError};
