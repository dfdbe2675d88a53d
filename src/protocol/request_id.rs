//! Correlation id type for RPC calls.
//!
//! This module provides a type-safe wrapper for the `cmd_id` field, preventing
//! confusion with other integer types.

/// Name of the correlation field on outbound RPC requests and their replies.
pub const CMD_ID_FIELD: &str = "cmd_id";

/// Correlation id tying an outbound RPC call to its eventual reply.
///
/// Ids are generated locally and increase monotonically for the lifetime of
/// the connection, so a given id is never reused while its pending entry
/// exists.
///
/// # Wire Format
///
/// Outbound requests always carry a JSON integer. Replies are accepted with
/// either an integer or a numeric string, since servers that round-trip the
/// id through a string-keyed store send it back as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(i64);

impl RequestId {
    /// Create a new RequestId from an i64 value.
    #[inline]
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the underlying i64 value.
    #[inline]
    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// Extract the RequestId from an inbound message.
    ///
    /// Returns `None` when `cmd_id` is missing, null, or not an integer.
    pub fn from_json(message: &serde_json::Value) -> Option<Self> {
        let raw = message.get(CMD_ID_FIELD)?;
        raw.as_i64()
            .or_else(|| raw.as_str().and_then(|text| text.trim().parse().ok()))
            .map(Self)
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<RequestId> for i64 {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn request_id_round_trips_through_i64() {
        let id: RequestId = 123.into();
        let value: i64 = id.into();
        assert_eq!(value, 123);
        assert_eq!(id.as_i64(), 123);
    }

    #[rstest]
    #[case::integer(json!({"cmd_id": 42, "status": "ok"}), Some(42))]
    #[case::numeric_string(json!({"cmd_id": "7", "status": "ok"}), Some(7))]
    #[case::missing(json!({"msg_type": "service"}), None)]
    #[case::null(json!({"cmd_id": null}), None)]
    #[case::non_numeric_string(json!({"cmd_id": "abc"}), None)]
    #[case::float(json!({"cmd_id": 1.5}), None)]
    fn request_id_from_json(#[case] message: serde_json::Value, #[case] expected: Option<i64>) {
        assert_eq!(RequestId::from_json(&message), expected.map(RequestId::new));
    }

    #[test]
    fn request_id_orders_by_value() {
        assert!(RequestId::new(1) < RequestId::new(2));
    }
}
