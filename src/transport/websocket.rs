//! WebSocket transport built on tokio-tungstenite.
//!
//! `connect` returns immediately with the connection still `Connecting`; a
//! background task performs the handshake, reports `Opened`, then pumps
//! frames in both directions until either side closes.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{FRAME_QUEUE_CAPACITY, Transport, TransportEvent, TransportTaskHandle};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a WebSocket connection to `endpoint` in the background.
///
/// Must be called from within a tokio runtime.
pub fn connect(endpoint: &Url) -> Transport {
    let (outgoing_tx, outgoing_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
    let (events_tx, events_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
    let cancel_token = CancellationToken::new();

    let join_handle = tokio::spawn(connection_task(
        endpoint.clone(),
        outgoing_rx,
        events_tx,
        cancel_token.clone(),
    ));

    Transport::new(outgoing_tx, events_rx)
        .with_task(TransportTaskHandle::new(join_handle, cancel_token))
}

async fn connection_task(
    endpoint: Url,
    outgoing: mpsc::Receiver<String>,
    events: mpsc::Sender<TransportEvent>,
    cancel_token: CancellationToken,
) {
    let connected = tokio::select! {
        _ = cancel_token.cancelled() => return,
        result = connect_async(endpoint.as_str()) => result,
    };

    let ws = match connected {
        Ok((ws, _response)) => ws,
        Err(e) => {
            log::warn!(
                target: "dce::transport::websocket",
                "Failed to connect to {}: {}",
                endpoint,
                e
            );
            let _ = events
                .send(TransportEvent::Closed {
                    reason: Some(format!("connect failed: {}", e)),
                })
                .await;
            return;
        }
    };

    if events.send(TransportEvent::Opened).await.is_err() {
        return;
    }

    let reason = pump_frames(ws, outgoing, &events, &cancel_token).await;
    let _ = events.send(TransportEvent::Closed { reason }).await;
}

/// Move frames between the socket and the channels.
///
/// Returns the close reason, if any, once the connection ends.
async fn pump_frames(
    ws: WsStream,
    mut outgoing: mpsc::Receiver<String>,
    events: &mpsc::Sender<TransportEvent>,
    cancel_token: &CancellationToken,
) -> Option<String> {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                log::debug!(
                    target: "dce::transport::websocket",
                    "Transport task cancelled, closing socket"
                );
                let _ = sink.send(Message::Close(None)).await;
                return Some("cancelled".to_string());
            }

            frame = outgoing.recv() => {
                let Some(frame) = frame else {
                    // Client dropped its sender; nothing more will be sent.
                    let _ = sink.send(Message::Close(None)).await;
                    return None;
                };
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    log::warn!(
                        target: "dce::transport::websocket",
                        "Write error: {}",
                        e
                    );
                    return Some(format!("write error: {}", e));
                }
            }

            message = stream.next() => {
                let message = match message {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        log::warn!(
                            target: "dce::transport::websocket",
                            "Read error: {}",
                            e
                        );
                        return Some(format!("read error: {}", e));
                    }
                    None => return None,
                };

                let frame = match message {
                    Message::Text(text) => text.to_string(),
                    Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => text,
                        Err(_) => {
                            log::warn!(
                                target: "dce::transport::websocket",
                                "Dropping non UTF-8 binary frame ({} bytes)",
                                bytes.len()
                            );
                            continue;
                        }
                    },
                    Message::Close(close) => {
                        return close.map(|frame| frame.reason.to_string());
                    }
                    // Ping/pong are answered by tungstenite itself.
                    _ => continue,
                };

                if events.send(TransportEvent::Frame(frame)).await.is_err() {
                    // Reader is gone; stop pumping.
                    return None;
                }
            }
        }
    }
}
