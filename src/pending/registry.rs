//! Pending-request registry.
//!
//! Each outstanding request moves through an explicit state machine:
//!
//! ```text
//!            ┌──► Fulfilled   (response arrived)
//! Pending ───┼──► TimedOut    (deadline fired)
//!            └──► Cancelled   (connection closed)
//! ```
//!
//! All terminal states are final and mutually exclusive. Only the first
//! transition takes the completion, so the callback runs at most once no
//! matter how responses, timers and teardown interleave.
//!
//! [`PendingRegistry`] is the plain data structure. [`PendingRequests`] is the
//! connection-scoped owner: it serializes access with one mutex per
//! connection, disarms timers, and runs completions after the lock is
//! released so they may call back into the correlator.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use super::deadline::{DeadlineHandle, TimeoutSupervisor};
use crate::error::{ReplywireError, Result};

/// Callback receiving the outcome of one request.
pub type Completion = Box<dyn FnOnce(Result<Value>) + Send + 'static>;

/// Correlation id linking a request to its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(String);

impl RequestId {
    /// Fresh random id (UUID v4, 122 random bits).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RequestId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How a request left the `Pending` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A matching response arrived.
    Fulfilled,
    /// The deadline fired first.
    TimedOut,
    /// The connection was torn down.
    Cancelled,
}

/// Lifecycle state of one request.
pub enum RequestState {
    /// Waiting; owns the completion.
    Pending(Completion),
    /// Terminal: answered.
    Fulfilled,
    /// Terminal: deadline fired.
    TimedOut,
    /// Terminal: connection closed.
    Cancelled,
}

impl RequestState {
    /// Whether the request is still waiting.
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestState::Pending(_))
    }
}

impl From<Outcome> for RequestState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Fulfilled => RequestState::Fulfilled,
            Outcome::TimedOut => RequestState::TimedOut,
            Outcome::Cancelled => RequestState::Cancelled,
        }
    }
}

impl fmt::Debug for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestState::Pending(_) => f.write_str("Pending"),
            RequestState::Fulfilled => f.write_str("Fulfilled"),
            RequestState::TimedOut => f.write_str("TimedOut"),
            RequestState::Cancelled => f.write_str("Cancelled"),
        }
    }
}

/// An issued request awaiting resolution.
#[derive(Debug)]
pub struct PendingRequest {
    id: RequestId,
    state: RequestState,
    deadline: Option<DeadlineHandle>,
}

impl PendingRequest {
    fn new(id: RequestId, completion: Completion) -> Self {
        Self {
            id,
            state: RequestState::Pending(completion),
            deadline: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Move to a terminal state. Only the first call yields the completion.
    fn settle(&mut self, outcome: Outcome) -> Option<Settled> {
        match std::mem::replace(&mut self.state, outcome.into()) {
            RequestState::Pending(completion) => Some(Settled {
                id: self.id.clone(),
                outcome,
                completion,
                deadline: self.deadline.take(),
            }),
            previous => {
                self.state = previous;
                None
            }
        }
    }
}

/// A request that has just left the `Pending` state.
///
/// Holds everything needed to finish it outside the registry lock.
pub struct Settled {
    id: RequestId,
    outcome: Outcome,
    completion: Completion,
    deadline: Option<DeadlineHandle>,
}

impl Settled {
    /// Id of the settled request.
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// The transition that happened.
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Disarm the deadline, then deliver `result` to the completion.
    pub fn complete(mut self, result: Result<Value>) {
        if let Some(mut deadline) = self.deadline.take() {
            deadline.disarm();
        }
        (self.completion)(result);
    }
}

impl fmt::Debug for Settled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settled")
            .field("id", &self.id)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Map of outstanding requests for one connection.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    entries: HashMap<RequestId, PendingRequest>,
    closed: bool,
}

impl PendingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending entry.
    ///
    /// Returns the completion back if the registry is closed.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already pending. Ids are random, so this indicates
    /// a broken caller.
    pub fn insert(&mut self, id: RequestId, completion: Completion) -> std::result::Result<(), Completion> {
        if self.closed {
            return Err(completion);
        }
        assert!(
            !self.entries.contains_key(&id),
            "duplicate pending request id {}",
            id
        );
        self.entries
            .insert(id.clone(), PendingRequest::new(id, completion));
        Ok(())
    }

    /// Attach a deadline to a pending entry.
    ///
    /// If the entry is already gone the handle is dropped, which disarms it.
    pub fn set_deadline(&mut self, id: &str, deadline: DeadlineHandle) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.deadline = Some(deadline);
        }
    }

    /// Settle `id` and remove it. `None` if it is unknown or already settled.
    pub fn settle(&mut self, id: &str, outcome: Outcome) -> Option<Settled> {
        let settled = self.entries.get_mut(id)?.settle(outcome);
        self.entries.remove(id);
        settled
    }

    /// Cancel every entry and refuse new ones.
    pub fn drain(&mut self) -> Vec<Settled> {
        self.closed = true;
        self.entries
            .drain()
            .filter_map(|(_, mut entry)| entry.settle(Outcome::Cancelled))
            .collect()
    }

    /// Whether `id` is pending.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the registry was drained.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Connection-scoped owner of the pending requests.
#[derive(Debug, Default)]
pub struct PendingRequests {
    registry: Mutex<PendingRegistry>,
}

impl PendingRequests {
    /// Create an empty, shared registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, PendingRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a request and arm its deadline.
    ///
    /// Returns `false` if the connection is already closed; the completion
    /// then receives [`ReplywireError::ConnectionClosed`] right away.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate id, or when called outside a Tokio runtime.
    pub fn register(
        self: &Arc<Self>,
        id: RequestId,
        completion: Completion,
        timeout: Duration,
    ) -> bool {
        let mut registry = self.lock();
        match registry.insert(id.clone(), completion) {
            Ok(()) => {
                // Armed under the lock: the timer cannot observe the entry
                // before its deadline is attached.
                let deadline = TimeoutSupervisor::arm(self, id.clone(), timeout);
                registry.set_deadline(id.as_str(), deadline);
                true
            }
            Err(completion) => {
                drop(registry);
                completion(Err(ReplywireError::ConnectionClosed));
                false
            }
        }
    }

    /// Deliver the response for `id`.
    ///
    /// Returns `false` for unknown or already settled ids; late and
    /// duplicate responses are silently ignored.
    pub fn resolve(&self, id: &str, result: Result<Value>) -> bool {
        let settled = self.lock().settle(id, Outcome::Fulfilled);
        match settled {
            Some(settled) => {
                settled.complete(result);
                true
            }
            None => false,
        }
    }

    /// Fail `id` with `error`. Timeouts settle as `TimedOut`, anything
    /// else as `Cancelled`.
    pub fn cancel(&self, id: &str, error: ReplywireError) -> bool {
        let outcome = if error.is_timeout() {
            Outcome::TimedOut
        } else {
            Outcome::Cancelled
        };
        let settled = self.lock().settle(id, outcome);
        match settled {
            Some(settled) => {
                settled.complete(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail every pending request with `error` and refuse new ones.
    ///
    /// Returns how many requests were cancelled.
    pub fn drain_all(&self, error: ReplywireError) -> usize {
        let drained = self.lock().drain();
        let count = drained.len();
        for settled in drained {
            settled.complete(Err(error.clone()));
        }
        count
    }

    /// Number of requests awaiting a response.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `id` is pending.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    /// Whether the connection was torn down.
    pub fn is_closed(&self) -> bool {
        self.lock().is_closed()
    }
}

impl Drop for PendingRequests {
    fn drop(&mut self) {
        let registry = self
            .registry
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for settled in registry.drain() {
            settled.complete(Err(ReplywireError::ConnectionClosed));
        }
    }
}
