//! JSON encoding of text frames.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{DceError, DceResult};

/// Serialize an outbound message into a text frame.
pub fn encode<T: Serialize>(message: &T) -> DceResult<String> {
    serde_json::to_string(message)
        .map_err(|e| DceError::client(format!("request json encode error: {}", e)))
}

/// Parse an inbound text frame.
///
/// A frame that is not valid JSON for `T` is a client error.
pub fn decode<T: DeserializeOwned>(frame: &str) -> DceResult<T> {
    serde_json::from_str(frame)
        .map_err(|e| DceError::client(format!("response json parse error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FireMessage, OutboundMessage, RequestId, RpcRequest};
    use rstest::rstest;
    use serde_json::{Value, json};

    #[rstest]
    #[case::rpc(OutboundMessage::Rpc(RpcRequest::new(
        "billing.invoice.create",
        json!({"amount": 10, "lines": [1, 2]}),
        RequestId::new(9),
    )))]
    #[case::fire(OutboundMessage::Fire(FireMessage::new(
        "chat.send",
        json!({"text": "hi", "callbacks": ["Chat"]}),
    )))]
    #[case::array_payload(OutboundMessage::Fire(FireMessage::new("log.write", json!([1, "two"]))))]
    fn decode_reproduces_action_and_data(#[case] message: OutboundMessage) {
        let frame = encode(&message).unwrap();
        let decoded: OutboundMessage = decode(&frame).unwrap();

        assert_eq!(decoded.action(), message.action());
        assert_eq!(decoded.data(), message.data());
        assert_eq!(decoded, message);
    }

    #[test]
    fn decode_rejects_malformed_frame() {
        let err = decode::<Value>("{not json").unwrap_err();
        assert!(matches!(err, DceError::Client { .. }));
        assert!(
            err.to_string().contains("response json parse error"),
            "unexpected message: {}",
            err
        );
    }
}
