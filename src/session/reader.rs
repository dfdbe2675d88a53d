//! Reader task draining transport events into the session.
//!
//! The Reader Task:
//! - Runs in a spawned tokio task and owns the transport's event receiver
//! - Applies open/close events to the connection state
//! - Hands every text frame to `Session::handle_frame`, so replies, the
//!   manifest and push messages are processed one at a time in arrival order
//! - Stops on transport close, on cancellation, or on a fatal inbound error
//!   when no error hook is installed
//!
//! The loop runs under a supervisor task. A panic inside inbound processing
//! (a consumer handler, typically) unwinds only the inner task; the
//! supervisor still closes the connection, fails pending calls and reports
//! the panic as the fatal error.
//!
//! The transport's own task handle lives inside the reader, so the socket is
//! released as soon as the reader stops.

use std::any::Any;
use std::sync::{Arc, Mutex};

use log::{debug, error, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::Session;
use crate::error::{DceError, DceResult, LockResultExt};
use crate::transport::{Transport, TransportEvent};

/// Receives fatal inbound errors instead of stopping the reader.
pub(crate) type ErrorHook = Arc<dyn Fn(DceError) + Send + Sync>;

/// Handle to a running Reader Task.
///
/// Dropping the handle cancels the reader, which in turn closes the
/// transport.
pub(crate) struct ReaderTaskHandle {
    /// Join handle for the supervisor task (dropped on struct drop)
    _supervisor_handle: JoinHandle<()>,
    /// Token to signal graceful shutdown (cancelled on drop)
    cancel_token: CancellationToken,
    /// Cancelled by the task itself once the loop has exited
    stopped: CancellationToken,
    /// Fatal error the loop stopped on, until someone takes it
    outcome: Arc<Mutex<Option<DceError>>>,
}

impl ReaderTaskHandle {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Wait for the reader to stop.
    ///
    /// Returns the fatal error it stopped on, if any. The error is handed to
    /// the first caller only; later callers see `Ok(())`.
    pub(crate) async fn closed(&self) -> DceResult<()> {
        self.stopped.cancelled().await;
        match self
            .outcome
            .lock()
            .recover_poison("ReaderTaskHandle::closed()")
            .take()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for ReaderTaskHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Spawn a reader task feeding `transport` events into `session`.
pub(crate) fn spawn_reader_task(
    session: Arc<Session>,
    transport: Transport,
    error_hook: Option<ErrorHook>,
) -> ReaderTaskHandle {
    let cancel_token = CancellationToken::new();
    let stopped = CancellationToken::new();
    let outcome = Arc::new(Mutex::new(None));

    let reader_handle = tokio::spawn(reader_loop(
        Arc::clone(&session),
        transport,
        error_hook,
        cancel_token.clone(),
    ));

    // Supervisor: whatever way the loop ends, the connection is closed and
    // waiters on `closed()` are released.
    let stopped_clone = stopped.clone();
    let outcome_clone = Arc::clone(&outcome);
    let supervisor_handle = tokio::spawn(async move {
        let result = match reader_handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let panic_msg = panic_message(e.into_panic());
                error!(
                    target: "dce::session::reader",
                    "Reader task PANICKED: {}",
                    panic_msg
                );
                session.on_close(Some("reader panicked"));
                Err(DceError::client(format!(
                    "inbound processing panicked: {}",
                    panic_msg
                )))
            }
            Err(e) => {
                warn!(
                    target: "dce::session::reader",
                    "Reader task was cancelled: {}",
                    e
                );
                session.on_close(Some("reader cancelled"));
                Ok(())
            }
        };
        if let Err(err) = result {
            *outcome_clone
                .lock()
                .recover_poison("reader task outcome") = Some(err);
        }
        stopped_clone.cancel();
    });

    ReaderTaskHandle {
        _supervisor_handle: supervisor_handle,
        cancel_token,
        stopped,
        outcome,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// The main reader loop.
async fn reader_loop(
    session: Arc<Session>,
    mut transport: Transport,
    error_hook: Option<ErrorHook>,
    cancel_token: CancellationToken,
) -> DceResult<()> {
    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                debug!(
                    target: "dce::session::reader",
                    "Reader task cancelled, shutting down"
                );
                session.on_close(Some("client dropped"));
                return Ok(());
            }

            event = transport.events.recv() => {
                match event {
                    Some(TransportEvent::Opened) => session.on_open(),
                    Some(TransportEvent::Frame(frame)) => {
                        let Err(err) = session.handle_frame(&frame) else {
                            continue;
                        };
                        match &error_hook {
                            Some(hook) => hook(err),
                            None => {
                                warn!(
                                    target: "dce::session::reader",
                                    "Inbound processing failed, closing connection: {}",
                                    err
                                );
                                session.on_close(Some("fatal inbound error"));
                                return Err(err);
                            }
                        }
                    }
                    Some(TransportEvent::Closed { reason }) => {
                        session.on_close(reason.as_deref());
                        return Ok(());
                    }
                    None => {
                        session.on_close(Some("transport gone"));
                        return Ok(());
                    }
                }
            }
        }
    }
}
