//! Scripted DCEngine server over the in-memory transport.

use std::time::Duration;

use dce_client::transport::memory::{self, MemoryPeer};
use dce_client::{ClientBuilder, DceClient};
use serde_json::{Value, json};

/// Upper bound for any single wait in E2E tests.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval short enough to keep E2E tests fast.
pub const FAST_POLL: Duration = Duration::from_millis(10);

/// The manifest used throughout the E2E tests.
pub fn sample_actions() -> Value {
    json!([
        {"name": "billing.invoice.create", "type": "rpc"},
        {"name": "billing.invoice.void", "type": "rpc"},
        {"name": "chat.send", "type": "fire"},
        {"name": "ping", "type": "rpc"}
    ])
}

pub struct FakeServer {
    peer: MemoryPeer,
}

impl FakeServer {
    /// Build a client from `builder` wired to a fresh fake server.
    pub fn connect(builder: ClientBuilder) -> (DceClient, FakeServer) {
        let (transport, peer) = memory::pair();
        let client = builder
            .open_poll_interval(FAST_POLL)
            .ready_poll_interval(FAST_POLL)
            .with_transport(transport);
        (client, FakeServer { peer })
    }

    pub async fn open(&self) {
        self.peer.open().await;
    }

    pub async fn close(&self, reason: Option<&str>) {
        self.peer.close(reason).await;
    }

    pub async fn send_manifest(&self, actions: Value, version: Value) {
        self.peer
            .send_json(&json!({
                "msg_type": "service",
                "status": "ok",
                "data": {"actions": actions, "version": version}
            }))
            .await;
    }

    /// Open the connection and announce [`sample_actions`].
    pub async fn open_with_sample_manifest(&self) {
        self.open().await;
        self.send_manifest(sample_actions(), json!("1.0")).await;
    }

    pub async fn send(&self, message: Value) {
        self.peer.send_json(&message).await;
    }

    pub async fn send_raw(&self, frame: &str) {
        self.peer.send_text(frame).await;
    }

    /// Next frame written by the client, failing the test after
    /// [`STEP_TIMEOUT`].
    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(STEP_TIMEOUT, self.peer.recv_json())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client transport closed")
    }

    /// A frame already written by the client, without waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.peer
            .try_recv_text()
            .map(|frame| serde_json::from_str(&frame).expect("client frames are JSON"))
    }

    /// Reply successfully to the RPC request `request`.
    pub async fn reply_ok(&self, request: &Value, data: Value) {
        self.send(json!({"cmd_id": request["cmd_id"], "status": "ok", "data": data}))
            .await;
    }

    /// Reply with an error to the RPC request `request`.
    pub async fn reply_error(&self, request: &Value, error: &str, error_data: Value) {
        self.send(json!({
            "cmd_id": request["cmd_id"],
            "status": "error",
            "error": error,
            "error_data": error_data
        }))
        .await;
    }
}

/// Await `future`, failing the test after [`STEP_TIMEOUT`].
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(STEP_TIMEOUT, future)
        .await
        .expect("step timed out")
}
