//! In-process transport.
//!
//! `pair()` returns a `Transport` for the client and a `MemoryPeer` playing
//! the server: the peer decides when the connection opens, pushes frames and
//! reads whatever the client sends.

use serde_json::Value;
use tokio::sync::mpsc;

use super::{FRAME_QUEUE_CAPACITY, Transport, TransportEvent};

/// Create a connected transport/peer pair. The connection starts unopened.
pub fn pair() -> (Transport, MemoryPeer) {
    let (outgoing_tx, outgoing_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
    let (events_tx, events_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
    (
        Transport::new(outgoing_tx, events_rx),
        MemoryPeer {
            events: events_tx,
            outgoing: outgoing_rx,
        },
    )
}

/// Server side of an in-process transport.
#[derive(Debug)]
pub struct MemoryPeer {
    events: mpsc::Sender<TransportEvent>,
    outgoing: mpsc::Receiver<String>,
}

impl MemoryPeer {
    /// Mark the connection open.
    pub async fn open(&self) {
        self.emit(TransportEvent::Opened).await;
    }

    /// Close the connection.
    pub async fn close(&self, reason: Option<&str>) {
        self.emit(TransportEvent::Closed {
            reason: reason.map(str::to_owned),
        })
        .await;
    }

    /// Deliver a raw text frame to the client.
    pub async fn send_text(&self, frame: impl Into<String>) {
        self.emit(TransportEvent::Frame(frame.into())).await;
    }

    /// Deliver a JSON message to the client.
    pub async fn send_json(&self, message: &Value) {
        self.send_text(message.to_string()).await;
    }

    /// Next frame written by the client, or `None` once the client is gone.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.outgoing.recv().await
    }

    /// Next frame written by the client, parsed as JSON.
    ///
    /// Frames that are not valid JSON come back as `Value::String`.
    pub async fn recv_json(&mut self) -> Option<Value> {
        let frame = self.recv_text().await?;
        Some(serde_json::from_str(&frame).unwrap_or(Value::String(frame)))
    }

    /// A frame the client has already written, without waiting.
    pub fn try_recv_text(&mut self) -> Option<String> {
        self.outgoing.try_recv().ok()
    }

    async fn emit(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            log::debug!(
                target: "dce::transport::memory",
                "Client side of memory transport is gone, dropping event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn peer_events_reach_transport() {
        let (mut transport, peer) = pair();

        peer.open().await;
        peer.send_json(&json!({"data": 1})).await;
        peer.close(Some("bye")).await;

        assert_eq!(transport.events.recv().await, Some(TransportEvent::Opened));
        assert_eq!(
            transport.events.recv().await,
            Some(TransportEvent::Frame(r#"{"data":1}"#.to_string()))
        );
        assert_eq!(
            transport.events.recv().await,
            Some(TransportEvent::Closed {
                reason: Some("bye".to_string())
            })
        );
    }

    #[tokio::test]
    async fn client_frames_reach_peer() {
        let (transport, mut peer) = pair();

        transport
            .outgoing
            .send(r#"{"action":"a"}"#.to_string())
            .await
            .unwrap();
        transport.outgoing.send("plain".to_string()).await.unwrap();

        assert_eq!(peer.recv_json().await, Some(json!({"action": "a"})));
        assert_eq!(peer.recv_json().await, Some(json!("plain")));
        assert_eq!(peer.try_recv_text(), None);
    }
}
