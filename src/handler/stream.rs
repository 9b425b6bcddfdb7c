//! Stream of requests received from the peer.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use super::IncomingRequest;
use crate::error::Result;

/// Default maximum concurrent handlers for [`IncomingRequests::serve`].
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Application-facing "request received" events.
///
/// Dropping this stream makes the correlator discard incoming requests; the
/// requesters then run into their timeouts.
#[derive(Debug)]
pub struct IncomingRequests {
    rx: mpsc::UnboundedReceiver<IncomingRequest>,
}

impl IncomingRequests {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<IncomingRequest>) -> Self {
        Self { rx }
    }

    /// Wait for the next request. `None` once the correlator is gone.
    pub async fn recv(&mut self) -> Option<IncomingRequest> {
        self.rx.recv().await
    }

    /// Take a request if one is queued.
    pub fn try_recv(&mut self) -> Option<IncomingRequest> {
        self.rx.try_recv().ok()
    }

    /// Run `handler` for every request, each in its own task.
    ///
    /// At most `max_concurrent` handlers run at once; further requests wait
    /// for a slot. Handler errors are logged.
    pub fn serve<F, Fut>(self, max_concurrent: usize, handler: F) -> JoinHandle<()>
    where
        F: Fn(IncomingRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut rx = self.rx;
        let handler = Arc::new(handler);
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return,
                };

                let id = request.id().to_string();
                let fut = handler(request);
                tokio::spawn(async move {
                    // Permit is held until this task completes
                    let _permit = permit;
                    if let Err(e) = fut.await {
                        tracing::error!("Handler error for request {}: {}", id, e);
                    }
                });
            }
        })
    }
}
