//! Timeout supervision for outstanding requests.
//!
//! Every registered request gets one timer task. When it fires it cancels
//! the request with [`ReplywireError::Timeout`]. Resolving the request first
//! disarms the timer; the registry lock decides the winner if both happen
//! at the same moment, so the loser always finds the entry gone.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::AbortHandle;

use super::registry::{PendingRequests, RequestId};
use crate::error::ReplywireError;

/// Handle to an armed request deadline.
///
/// Disarming is idempotent. Dropping the handle disarms it as well, so a
/// registry that goes away never leaves timers behind.
#[derive(Debug)]
pub struct DeadlineHandle {
    abort: Option<AbortHandle>,
}

impl DeadlineHandle {
    fn new(abort: AbortHandle) -> Self {
        Self { abort: Some(abort) }
    }

    /// Stop the timer. No-op if it already fired or was disarmed.
    pub fn disarm(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }

    /// Whether the timer is still armed.
    pub fn is_armed(&self) -> bool {
        self.abort.as_ref().is_some_and(|a| !a.is_finished())
    }
}

impl Drop for DeadlineHandle {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Arms per-request deadlines.
///
/// Timers are tokio tasks, so arming requires a running Tokio runtime.
pub struct TimeoutSupervisor;

impl TimeoutSupervisor {
    /// Arm a deadline of `timeout` for request `id`.
    ///
    /// The timer only holds a weak reference to the registry.
    pub fn arm(pending: &Arc<PendingRequests>, id: RequestId, timeout: Duration) -> DeadlineHandle {
        let weak: Weak<PendingRequests> = Arc::downgrade(pending);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(pending) = weak.upgrade() {
                if pending.cancel(id.as_str(), ReplywireError::Timeout { timeout_ms }) {
                    tracing::debug!("Request {} timed out after {}ms", id, timeout_ms);
                }
            }
        });

        DeadlineHandle::new(task.abort_handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::Result;
    use serde_json::Value;

    fn recorder() -> (
        Arc<Mutex<Vec<Result<Value>>>>,
        Box<dyn FnOnce(Result<Value>) + Send>,
    ) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        (
            calls,
            Box::new(move |result| sink.lock().unwrap().push(result)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_timeout() {
        let pending = PendingRequests::new();
        let (calls, completion) = recorder();
        pending.register(RequestId::from("r1"), completion, Duration::from_millis(200));

        tokio::time::sleep(Duration::from_millis(199)).await;
        assert!(calls.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(matches!(
            calls[0],
            Err(ReplywireError::Timeout { timeout_ms: 200 })
        ));
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_is_idempotent() {
        let pending = PendingRequests::new();
        let mut handle = TimeoutSupervisor::arm(&pending, RequestId::from("x"), Duration::from_secs(1));
        assert!(handle.is_armed());

        handle.disarm();
        handle.disarm();
        assert!(!handle.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_for_unknown_id_is_noop() {
        let pending = PendingRequests::new();
        let _handle = TimeoutSupervisor::arm(&pending, RequestId::from("ghost"), Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pending.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_does_not_keep_registry_alive() {
        let pending = PendingRequests::new();
        let weak = Arc::downgrade(&pending);
        let handle = TimeoutSupervisor::arm(&pending, RequestId::from("x"), Duration::from_secs(1));

        drop(pending);
        assert!(weak.upgrade().is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        drop(handle);
    }
}
