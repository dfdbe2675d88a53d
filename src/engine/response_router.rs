//! Response routing for pending RPC calls.
//!
//! This module provides the ResponseRouter which tracks pending calls and
//! routes incoming replies to their waiters via oneshot channels.
//!
//! - Before sending a request, register it via `register(id)` to get a oneshot Receiver
//! - The reader task calls `route(id, reply)` when a reply carrying `cmd_id` arrives
//! - The caller awaits the Receiver without holding any lock

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::error::LockResultExt;
use crate::protocol::RequestId;

/// Outcome of routing a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteResult {
    /// The reply reached its waiter; the entry is gone.
    Delivered,
    /// An entry existed but its caller stopped waiting; the entry is gone.
    ReceiverDropped,
    /// No entry for this id (never issued, or already consumed).
    NoWaiter,
}

/// Why a call could not be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegisterError {
    /// A call with this id is already pending.
    DuplicateId,
    /// The router was closed; no reply can arrive any more.
    Closed,
}

#[derive(Default)]
struct PendingTable {
    waiters: HashMap<RequestId, oneshot::Sender<serde_json::Value>>,
    /// Set once by `close()`; registration is refused from then on.
    closed: bool,
}

/// Routes replies to pending calls via oneshot channels.
///
/// Delivery is at-most-once: routing removes the entry, so a second reply
/// for the same id finds no waiter.
///
/// # Usage
///
/// ```ignore
/// let router = ResponseRouter::new();
/// let rx = router.register(request_id);  // Before sending the request
/// // ... send request ...
/// let reply = rx.await?;  // Wait without holding the Mutex
/// ```
pub(crate) struct ResponseRouter {
    pending: Mutex<PendingTable>,
}

impl ResponseRouter {
    /// Create a new empty ResponseRouter.
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(PendingTable::default()),
        }
    }

    /// Register a pending call and return a receiver for its reply.
    ///
    /// Must be called before sending the request so the reply can be routed
    /// however quickly it arrives.
    ///
    /// Fails if a call with this id is already pending, or if the router has
    /// been closed. The closed check shares the table's lock with `close()`,
    /// so an entry is either refused here or dropped there.
    pub(crate) fn register(
        &self,
        id: RequestId,
    ) -> Result<oneshot::Receiver<serde_json::Value>, RegisterError> {
        let mut pending = self
            .pending
            .lock()
            .recover_poison("ResponseRouter::register()");

        if pending.closed {
            return Err(RegisterError::Closed);
        }
        if pending.waiters.contains_key(&id) {
            return Err(RegisterError::DuplicateId);
        }

        let (tx, rx) = oneshot::channel();
        pending.waiters.insert(id, tx);
        Ok(rx)
    }

    /// Route a reply to the call registered under `id`, removing the entry.
    pub(crate) fn route(&self, id: RequestId, reply: serde_json::Value) -> RouteResult {
        let sender = self
            .pending
            .lock()
            .recover_poison("ResponseRouter::route()")
            .waiters
            .remove(&id);

        match sender {
            Some(tx) => match tx.send(reply) {
                Ok(()) => RouteResult::Delivered,
                Err(_) => RouteResult::ReceiverDropped,
            },
            None => RouteResult::NoWaiter,
        }
    }

    /// Remove a pending call without delivering anything.
    ///
    /// Used for cleanup when a request fails before reaching the transport.
    ///
    /// Returns `true` if the call was pending.
    pub(crate) fn remove(&self, id: RequestId) -> bool {
        self.pending
            .lock()
            .recover_poison("ResponseRouter::remove()")
            .waiters
            .remove(&id)
            .is_some()
    }

    /// Drop every pending call and refuse new ones.
    ///
    /// Waiters observe a closed channel. Returns how many were pending.
    pub(crate) fn close(&self) -> usize {
        let mut pending = self
            .pending
            .lock()
            .recover_poison("ResponseRouter::close()");
        pending.closed = true;
        let count = pending.waiters.len();
        pending.waiters.clear();
        count
    }

    /// Whether a call with this id is waiting for its reply.
    pub(crate) fn is_pending(&self, id: RequestId) -> bool {
        self.pending
            .lock()
            .recover_poison("ResponseRouter::is_pending()")
            .waiters
            .contains_key(&id)
    }

    /// Get the number of pending calls.
    pub(crate) fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .recover_poison("ResponseRouter::pending_count()")
            .waiters
            .len()
    }
}
