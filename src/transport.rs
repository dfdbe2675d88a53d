//! Transport adapters carrying text frames.
//!
//! A transport is a pair of channels: frames to send go out through
//! `outgoing`, and lifecycle events plus received frames come back through
//! `events`. The client never touches the socket itself.
//!
//! ## Module Structure
//!
//! - `websocket` - tokio-tungstenite client task
//! - `memory` - in-process transport with a scriptable peer

pub mod memory;
pub mod websocket;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Queue capacity for frames in either direction.
pub const FRAME_QUEUE_CAPACITY: usize = 256;

/// Lifecycle event or frame delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open and `outgoing` frames will be delivered.
    Opened,
    /// A text frame arrived.
    Frame(String),
    /// The connection is gone. Terminal.
    Closed { reason: Option<String> },
}

/// Channel ends of a connection as seen by the client.
pub struct Transport {
    pub(crate) outgoing: mpsc::Sender<String>,
    pub(crate) events: mpsc::Receiver<TransportEvent>,
    pub(crate) task: Option<TransportTaskHandle>,
}

impl Transport {
    pub fn new(outgoing: mpsc::Sender<String>, events: mpsc::Receiver<TransportEvent>) -> Self {
        Self {
            outgoing,
            events,
            task: None,
        }
    }

    /// Attach the background task driving this transport so it is cancelled
    /// together with the client.
    pub fn with_task(mut self, task: TransportTaskHandle) -> Self {
        self.task = Some(task);
        self
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("outgoing_closed", &self.outgoing.is_closed())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

/// Handle to a running transport task.
///
/// Dropping the handle cancels the task.
pub struct TransportTaskHandle {
    /// Held so the task stays associated with its owner.
    _join_handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl TransportTaskHandle {
    pub fn new(join_handle: JoinHandle<()>, cancel_token: CancellationToken) -> Self {
        Self {
            _join_handle: join_handle,
            cancel_token,
        }
    }

    /// Ask the task to close the connection.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for TransportTaskHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
