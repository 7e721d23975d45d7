//! The push delivery service.
//!
//! Each submitted external action gets its own tokio task that sends it,
//! classifies the outcome and retries with exponential backoff. Delivered
//! tasks are discarded; tasks that give up leave a durable failure record
//! that an operator can inspect, discard or resend.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};

use crate::config::PushConfig;
use crate::error::{FederationError, Result};
use crate::identity::HostKeyring;
use crate::method::{self, Frame, Method, MethodKind, MethodScope, RemoteErrorKind};

use super::failure::{FailureId, FailureRecord, FailureStore};
use super::task::{Backoff, DeliveryError, DeliveryToken, PushState, PushTask};
use super::transport::{Transport, TransportError};

struct Tracked {
    task: PushTask,
    cancel_requested: bool,
    cancel: Arc<Notify>,
    state: watch::Sender<PushState>,
}

/// Terminal states of tasks no longer in flight, oldest dropped first.
struct Finished {
    states: HashMap<DeliveryToken, PushState>,
    order: VecDeque<DeliveryToken>,
    retention: usize,
}

impl Finished {
    fn new(retention: usize) -> Self {
        Self {
            states: HashMap::new(),
            order: VecDeque::new(),
            retention,
        }
    }

    fn record(&mut self, token: DeliveryToken, state: PushState) {
        if self.states.insert(token.clone(), state).is_none() {
            self.order.push_back(token);
        }
        while self.order.len() > self.retention {
            if let Some(oldest) = self.order.pop_front() {
                self.states.remove(&oldest);
            }
        }
    }

    fn get(&self, token: &DeliveryToken) -> Option<PushState> {
        self.states.get(token).copied()
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    failures: Arc<dyn FailureStore>,
    keyring: Arc<HostKeyring>,
    backoff: Backoff,
    max_attempts: u32,
    runtime: Handle,
    frames: AtomicU64,
    tasks: Mutex<HashMap<DeliveryToken, Tracked>>,
    finished: Mutex<Finished>,
}

/// Asynchronous, retrying delivery of external actions.
#[derive(Clone)]
pub struct PushService {
    inner: Arc<Inner>,
}

impl PushService {
    /// Create a service whose workers run on `runtime`.
    pub fn new(
        transport: Arc<dyn Transport>,
        failures: Arc<dyn FailureStore>,
        keyring: Arc<HostKeyring>,
        config: &PushConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                failures,
                keyring,
                backoff: config.backoff(),
                max_attempts: config.max_attempts.max(1),
                runtime,
                frames: AtomicU64::new(0),
                tasks: Mutex::new(HashMap::new()),
                finished: Mutex::new(Finished::new(config.finished_retention)),
            }),
        }
    }

    /// Queue an external action for delivery.
    pub fn submit(&self, action: Method) -> Result<DeliveryToken> {
        if action.scope != MethodScope::External || action.kind != MethodKind::Action {
            return Err(FederationError::MalformedMethod(format!(
                "only external actions are pushed, not {:?} {:?}",
                action.scope, action.kind
            )));
        }
        action.check_invariants()?;
        let body = method::encode(&action)?;

        let token = DeliveryToken::generate();
        let cancel = Arc::new(Notify::new());
        let (state, _) = watch::channel(PushState::Pending);
        self.inner.lock_tasks()?.insert(
            token.clone(),
            Tracked {
                task: PushTask::new(token.clone(), action.clone()),
                cancel_requested: false,
                cancel: cancel.clone(),
                state,
            },
        );
        log::info!(
            "push {token}: {} to {} queued",
            action.method_type,
            action.recipient
        );
        self.inner
            .runtime
            .spawn(deliver(self.inner.clone(), token.clone(), action, body, cancel));
        Ok(token)
    }

    /// Current state.
    ///
    /// Terminal states stay queryable after the task ends, for the most
    /// recent `finished_retention` tasks.
    pub fn state(&self, token: &DeliveryToken) -> Option<PushState> {
        if let Ok(tasks) = self.inner.tasks.lock() {
            if let Some(tracked) = tasks.get(token) {
                return Some(tracked.task.state);
            }
        }
        self.inner
            .finished
            .lock()
            .ok()
            .and_then(|f| f.get(token))
    }

    /// Snapshot of a task still in flight.
    pub fn task(&self, token: &DeliveryToken) -> Option<PushTask> {
        self.inner
            .tasks
            .lock()
            .ok()
            .and_then(|t| t.get(token).map(|tracked| tracked.task.clone()))
    }

    /// Snapshots of every task in flight.
    pub fn in_flight(&self) -> Vec<PushTask> {
        self.inner
            .tasks
            .lock()
            .map(|t| t.values().map(|tracked| tracked.task.clone()).collect())
            .unwrap_or_default()
    }

    /// Ask a task to stop. Returns `false` if it already finished.
    ///
    /// A frame already on the wire may still be executed by the recipient.
    pub fn cancel(&self, token: &DeliveryToken) -> bool {
        let Ok(mut tasks) = self.inner.tasks.lock() else {
            return false;
        };
        match tasks.get_mut(token) {
            Some(tracked) if !tracked.task.state.is_terminal() => {
                tracked.cancel_requested = true;
                tracked.cancel.notify_one();
                true
            }
            _ => false,
        }
    }

    /// Wait until the task reaches a terminal state.
    pub async fn wait(&self, token: &DeliveryToken) -> Option<PushState> {
        let receiver = self
            .inner
            .tasks
            .lock()
            .ok()
            .and_then(|t| t.get(token).map(|tracked| tracked.state.subscribe()));
        if let Some(mut receiver) = receiver {
            if let Ok(state) = receiver.wait_for(|s| s.is_terminal()).await {
                return Some(*state);
            }
        }
        self.state(token)
    }

    pub fn failures(&self) -> &Arc<dyn FailureStore> {
        &self.inner.failures
    }

    /// Submit the action of a failure record again and drop the record.
    pub fn resend(&self, id: &FailureId) -> Result<DeliveryToken> {
        let record = self.inner.failures.load(id)?;
        let token = self.submit(record.action)?;
        self.inner.failures.delete(id)?;
        log::info!("failure {id} resent as push {token}");
        Ok(token)
    }

    /// Drop a failure record without resending.
    pub fn discard(&self, id: &FailureId) -> Result<()> {
        self.inner.failures.delete(id)?;
        log::info!("failure {id} discarded");
        Ok(())
    }
}

impl Inner {
    fn lock_tasks(&self) -> Result<std::sync::MutexGuard<'_, HashMap<DeliveryToken, Tracked>>> {
        self.tasks
            .lock()
            .map_err(|_| FederationError::StorageError("push task table poisoned".into()))
    }

    /// Move to `Sending` for `attempt`; `false` if the task should stop.
    fn begin_attempt(&self, token: &DeliveryToken, attempt: u32) -> bool {
        let Ok(mut tasks) = self.tasks.lock() else {
            return false;
        };
        let Some(tracked) = tasks.get_mut(token) else {
            return false;
        };
        if tracked.cancel_requested {
            return false;
        }
        tracked.task.attempts = attempt;
        tracked.task.next_retry_at = None;
        tracked.task.state = PushState::Sending;
        tracked.state.send_replace(PushState::Sending);
        true
    }

    fn retrying(&self, token: &DeliveryToken, error: String, delay: Duration) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(tracked) = tasks.get_mut(token) {
                let delay_micros = u64::try_from(delay.as_micros()).unwrap_or(u64::MAX);
                tracked.task.last_error = Some(error);
                tracked.task.next_retry_at =
                    Some(crate::time::now_micros().saturating_add(delay_micros));
                tracked.task.state = PushState::Retrying;
                tracked.state.send_replace(PushState::Retrying);
            }
        }
    }

    /// Record the terminal state, then retire the task.
    ///
    /// Locks `tasks` before `finished`, so `state` never finds neither.
    fn finish(&self, token: &DeliveryToken, state: PushState) {
        let mut tasks = self.tasks.lock().ok();
        if let Ok(mut finished) = self.finished.lock() {
            finished.record(token.clone(), state);
        }
        let tracked = tasks.as_mut().and_then(|t| t.remove(token));
        drop(tasks);
        if let Some(tracked) = tracked {
            tracked.state.send_replace(state);
        }
    }

    fn give_up(&self, token: &DeliveryToken, action: Method, error: String, attempts: u32) {
        let record = FailureRecord::new(token.clone(), action, error, attempts);
        match self.failures.save(&record) {
            Ok(()) => log::warn!(
                "push {token} to {} failed after {attempts} attempt(s): {} (record {})",
                record.recipient,
                record.last_error,
                record.id
            ),
            Err(e) => log::error!(
                "push {token} failed ({}) and its failure record could not be saved: {e}",
                record.last_error
            ),
        }
        self.finish(token, PushState::PermanentlyFailed);
    }

    /// Turn a transport result into a delivery outcome.
    fn classify(
        &self,
        sent: std::result::Result<Vec<u8>, TransportError>,
        number: u64,
        action: &Method,
    ) -> std::result::Result<(), DeliveryError> {
        let bytes = match sent {
            Ok(bytes) => bytes,
            Err(TransportError::Network(e)) => return Err(DeliveryError::Transient(e)),
            Err(e @ TransportError::UnknownRecipient(_)) => {
                return Err(DeliveryError::Permanent(e.to_string()))
            }
        };
        let protocol = |e: String| DeliveryError::Permanent(format!("protocol: {e}"));
        let frame = Frame::decode(&bytes).map_err(|e| protocol(e.to_string()))?;
        let reply = method::decode_reply(&frame.body).map_err(|e| protocol(e.to_string()))?;
        if frame.number != number || !reply.correlates(number, &action.id) {
            return Err(protocol(format!(
                "reply #{} for {} does not answer #{number}",
                reply.number, reply.method
            )));
        }
        if reply.host != action.recipient {
            return Err(protocol(format!(
                "reply from {} instead of {}",
                reply.host, action.recipient
            )));
        }
        reply
            .verify(&self.keyring)
            .map_err(|_| protocol("reply signature invalid".into()))?;

        match reply.error() {
            None => Ok(()),
            Some(e) if e.kind == RemoteErrorKind::Replay => {
                log::info!("{} already recorded by {}", action.id, reply.host);
                Ok(())
            }
            Some(e) if e.is_transient() => Err(DeliveryError::Transient(e.message.clone())),
            Some(e) => Err(DeliveryError::Permanent(e.message.clone())),
        }
    }
}

async fn deliver(
    inner: Arc<Inner>,
    token: DeliveryToken,
    action: Method,
    body: Vec<u8>,
    cancel: Arc<Notify>,
) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        if !inner.begin_attempt(&token, attempt) {
            inner.finish(&token, PushState::Cancelled);
            return;
        }
        let number = inner.frames.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = match Frame::new(number, body.clone()).encode() {
            Ok(frame) => frame,
            Err(e) => {
                inner.give_up(&token, action, e.to_string(), attempt);
                return;
            }
        };

        let outcome = tokio::select! {
            sent = inner.transport.send(&action.recipient, frame) => {
                inner.classify(sent, number, &action)
            }
            _ = cancel.notified() => {
                log::info!("push {token} cancelled while sending");
                inner.finish(&token, PushState::Cancelled);
                return;
            }
        };

        match outcome {
            Ok(()) => {
                log::info!("push {token} delivered to {} (attempt {attempt})", action.recipient);
                inner.finish(&token, PushState::Delivered);
                return;
            }
            Err(DeliveryError::Permanent(e)) => {
                inner.give_up(&token, action, e, attempt);
                return;
            }
            Err(DeliveryError::Transient(e)) if attempt >= inner.max_attempts => {
                inner.give_up(&token, action, e, attempt);
                return;
            }
            Err(DeliveryError::Transient(e)) => {
                let delay = inner.backoff.delay_for_attempt(attempt);
                log::debug!("push {token} attempt {attempt} failed: {e}; retrying in {delay:?}");
                inner.retrying(&token, e, delay);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.notified() => {
                        log::info!("push {token} cancelled while waiting to retry");
                        inner.finish(&token, PushState::Cancelled);
                        return;
                    }
                }
            }
        }
    }
}
