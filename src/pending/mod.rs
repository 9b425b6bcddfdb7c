//! Pending module - outstanding request bookkeeping.
//!
//! Provides:
//! - [`PendingRequests`] - per-connection registry of requests awaiting a response
//! - [`TimeoutSupervisor`] - arms one deadline per request
//!
//! # Example
//!
//! ```ignore
//! use replywire::pending::{PendingRequests, RequestId};
//! use std::time::Duration;
//!
//! let pending = PendingRequests::new();
//! let id = RequestId::generate();
//!
//! pending.register(id.clone(), Box::new(|result| println!("{:?}", result)), Duration::from_secs(10));
//!
//! // later, when the response envelope arrives
//! pending.resolve(id.as_str(), Ok(serde_json::json!("pong")));
//! ```

mod deadline;
mod registry;

pub use deadline::{DeadlineHandle, TimeoutSupervisor};
pub use registry::{
    Completion, Outcome, PendingRegistry, PendingRequest, PendingRequests, RequestId,
    RequestState, Settled,
};
