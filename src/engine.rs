//! Correlation engine: owns the connection state and matches replies to calls.
//!
//! # Call flow
//!
//! RPC calls:
//! 1. Wait on the open barrier
//! 2. Allocate the next `cmd_id` and register it with the ResponseRouter
//! 3. Encode and send `{action, data, cmd_id}`
//! 4. Await the oneshot receiver (no lock held) and settle on the reply's `status`
//!
//! Fire-and-forget calls wait on the same barrier, send
//! `{action, data, callbacks}` and resolve without waiting for anything.
//!
//! There is no timeout: a reply that never arrives leaves the call pending
//! for as long as the connection lives. Closing the connection fails every
//! pending call with a transport error.

mod connection_state;
mod response_router;

pub use connection_state::ConnectionState;
pub use response_router::RouteResult;

use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{DceError, DceResult, LockResultExt, error_text};
use crate::protocol::{
    ActionKind, FireMessage, RequestId, RpcRequest, encode, is_error_status,
};
use crate::readiness::ReadinessBarrier;
use response_router::{RegisterError, ResponseRouter};

/// Single source of truth for the connection and for pending RPC calls.
pub struct CorrelationEngine {
    /// Connection state - std::sync::RwLock for fast, synchronous checks
    state: RwLock<ConnectionState>,
    /// Pending call table
    router: ResponseRouter,
    /// Frames handed to the transport
    outgoing: mpsc::Sender<String>,
    /// Last issued correlation id; the first call gets 1
    last_request_id: AtomicI64,
    /// Gates every send on the connection leaving `Connecting`
    open_barrier: ReadinessBarrier,
}

impl CorrelationEngine {
    pub(crate) fn new(outgoing: mpsc::Sender<String>, open_poll_interval: Duration) -> Self {
        Self {
            state: RwLock::new(ConnectionState::Connecting),
            router: ResponseRouter::new(),
            outgoing,
            last_request_id: AtomicI64::new(0),
            open_barrier: ReadinessBarrier::new("connection", open_poll_interval),
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self
            .state
            .read()
            .recover_poison("CorrelationEngine::state()")
    }

    /// Apply a state transition.
    ///
    /// Invalid transitions (anything out of `Closed`, or back to
    /// `Connecting`) are ignored. Returns `true` if the state changed.
    pub(crate) fn set_state(&self, next: ConnectionState) -> bool {
        let mut state = self
            .state
            .write()
            .recover_poison("CorrelationEngine::set_state()");
        if !state.can_transition_to(next) {
            return false;
        }
        *state = next;
        true
    }

    /// Number of RPC calls waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.router.pending_count()
    }

    /// Issue a call.
    ///
    /// RPC calls resolve with the reply's `data` (null when absent) or fail
    /// with `DceError::Rejected` when the reply's status is `"error"`.
    /// Fire-and-forget calls resolve with null as soon as the frame is queued.
    pub async fn call(&self, action: &str, kind: ActionKind, payload: Value) -> DceResult<Value> {
        match kind {
            ActionKind::Rpc => self.call_rpc(action, payload).await,
            ActionKind::FireAndForget => {
                self.send_fire(action, payload).await?;
                Ok(Value::Null)
            }
        }
    }

    async fn call_rpc(&self, action: &str, payload: Value) -> DceResult<Value> {
        self.wait_open().await?;

        let request_id = self.next_request_id();
        // A close may land between the open check and here; the router then
        // refuses the entry instead of leaving it unanswerable.
        let rx = self.router.register(request_id).map_err(|e| match e {
            RegisterError::Closed => {
                DceError::transport(format!("connection closed before {} was sent", action))
            }
            RegisterError::DuplicateId => {
                DceError::client(format!("duplicate pending cmd_id {}", request_id))
            }
        })?;

        let frame = match encode(&RpcRequest::new(action, payload, request_id)) {
            Ok(frame) => frame,
            Err(e) => {
                self.router.remove(request_id);
                return Err(e);
            }
        };

        if let Err(e) = self.send(frame).await {
            self.router.remove(request_id);
            return Err(e);
        }
        log::trace!(
            target: "dce::engine",
            "Sent {} as cmd_id {}",
            action,
            request_id
        );

        let reply = rx.await.map_err(|_| {
            DceError::transport(format!("connection closed before {} replied", action))
        })?;
        settle_reply(action, reply)
    }

    async fn send_fire(&self, action: &str, payload: Value) -> DceResult<()> {
        self.wait_open().await?;
        let frame = encode(&FireMessage::new(action, payload))?;
        self.send(frame).await
    }

    /// Wait until the connection leaves `Connecting`.
    ///
    /// Fails when it ended up `Closed`, since it never reopens.
    async fn wait_open(&self) -> DceResult<()> {
        self.open_barrier
            .wait_until(|| self.state().is_settled())
            .await;
        match self.state() {
            ConnectionState::Open => Ok(()),
            state => Err(DceError::transport(format!("connection is {}", state))),
        }
    }

    async fn send(&self, frame: String) -> DceResult<()> {
        self.outgoing
            .send(frame)
            .await
            .map_err(|_| DceError::transport("connection closed"))
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::new(self.last_request_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Abandon every pending call and refuse new ones. Returns how many
    /// there were.
    pub(crate) fn fail_pending(&self) -> usize {
        self.router.close()
    }

    /// Deliver a reply to the call registered under `id`.
    pub(crate) fn route_reply(&self, id: RequestId, reply: Value) -> RouteResult {
        let result = self.router.route(id, reply);
        if result != RouteResult::Delivered {
            log::debug!(
                target: "dce::engine",
                "Reply for cmd_id {} dropped ({:?})",
                id,
                result
            );
        }
        result
    }
}

impl std::fmt::Debug for CorrelationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationEngine")
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .field("last_request_id", &self.last_request_id.load(Ordering::Relaxed))
            .finish()
    }
}

/// Turn an RPC reply into the call's result.
fn settle_reply(action: &str, reply: Value) -> DceResult<Value> {
    if is_error_status(reply.get("status")) {
        return Err(DceError::Rejected {
            action: action.to_string(),
            error: error_text(reply.get("error")),
            error_data: reply.get("error_data").cloned().unwrap_or(Value::Null),
        });
    }
    Ok(reply.get("data").cloned().unwrap_or(Value::Null))
}
