//! Message shapes exchanged over the channel.
//!
//! Outbound traffic is typed (`RpcRequest`, `FireMessage`). Inbound traffic
//! stays a `serde_json::Value` until it has been matched against the pending
//! table; whatever is left is classified here as either the service manifest
//! or a push message.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::request_id::RequestId;
use crate::error::{DceError, DceResult};

/// `msg_type` value marking a service (manifest) message.
pub const SERVICE_MSG_TYPE: &str = "service";

/// `status` value marking a failed reply, service message or push.
pub const ERROR_STATUS: &str = "error";

/// Manifest `type` value for actions that expect a reply.
const RPC_TYPE: &str = "rpc";

/// Returns true when a `status` field reports an error.
pub fn is_error_status(status: Option<&Value>) -> bool {
    status.and_then(Value::as_str) == Some(ERROR_STATUS)
}

/// How an action is invoked on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// A reply is expected and correlated by `cmd_id`.
    Rpc,
    /// Sent once, resolved immediately, never matched against a reply.
    FireAndForget,
}

impl ActionKind {
    /// Classify a manifest `type` string. Anything but `"rpc"` is fire-and-forget.
    pub fn from_wire(kind: &str) -> Self {
        if kind == RPC_TYPE {
            ActionKind::Rpc
        } else {
            ActionKind::FireAndForget
        }
    }

    /// Wire form used when a descriptor is serialized back out.
    pub fn as_wire(self) -> &'static str {
        match self {
            ActionKind::Rpc => RPC_TYPE,
            ActionKind::FireAndForget => "fire",
        }
    }

    /// Short upper-case label used in manifest summaries.
    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Rpc => "RPC",
            ActionKind::FireAndForget => "FIRE",
        }
    }
}

impl<'de> Deserialize<'de> for ActionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kind = String::deserialize(deserializer)?;
        Ok(ActionKind::from_wire(&kind))
    }
}

impl Serialize for ActionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

/// A named remote capability declared by the server manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Dot-separated qualified name, e.g. `billing.invoice.create`.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
}

impl ActionDescriptor {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// `[RPC] billing.invoice.create`
    pub fn summary(&self) -> String {
        format!("[{}] {}", self.kind.label(), self.name)
    }
}

/// The `data` payload of a successful service message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub actions: Vec<ActionDescriptor>,
    /// Server-side version tag; any JSON value.
    #[serde(default)]
    pub version: Value,
}

/// Outbound RPC request: `{action, data, cmd_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub action: String,
    pub data: Value,
    pub cmd_id: i64,
}

impl RpcRequest {
    pub fn new(action: impl Into<String>, data: Value, request_id: RequestId) -> Self {
        Self {
            action: action.into(),
            data,
            cmd_id: request_id.as_i64(),
        }
    }
}

/// Outbound fire-and-forget message: `{action, data, callbacks}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireMessage {
    pub action: String,
    pub data: Value,
    #[serde(default)]
    pub callbacks: Vec<Value>,
}

impl FireMessage {
    /// Build the message, lifting `data.callbacks` into metadata when it is an array.
    pub fn new(action: impl Into<String>, data: Value) -> Self {
        let callbacks = data
            .get("callbacks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Self {
            action: action.into(),
            data,
            callbacks,
        }
    }
}

/// Any message this client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Rpc(RpcRequest),
    Fire(FireMessage),
}

impl OutboundMessage {
    pub fn action(&self) -> &str {
        match self {
            OutboundMessage::Rpc(request) => &request.action,
            OutboundMessage::Fire(message) => &message.action,
        }
    }

    pub fn data(&self) -> &Value {
        match self {
            OutboundMessage::Rpc(request) => &request.data,
            OutboundMessage::Fire(message) => &message.data,
        }
    }

    /// Correlation id, present only on RPC requests.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            OutboundMessage::Rpc(request) => Some(RequestId::new(request.cmd_id)),
            OutboundMessage::Fire(_) => None,
        }
    }
}

/// A server push addressed to zero or more consumers.
///
/// Every field is optional on the wire; a frame that is not a JSON object
/// yields an empty push.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushMessage {
    pub msg_type: Option<Value>,
    pub consumers: Option<Value>,
    pub data: Option<Value>,
    pub status: Option<Value>,
    pub error: Option<Value>,
    pub error_data: Option<Value>,
}

impl PushMessage {
    pub fn from_value(message: Value) -> Self {
        match message {
            Value::Object(mut fields) => Self {
                msg_type: fields.remove("msg_type"),
                consumers: fields.remove("consumers"),
                data: fields.remove("data"),
                status: fields.remove("status"),
                error: fields.remove("error"),
                error_data: fields.remove("error_data"),
            },
            _ => Self::default(),
        }
    }

    /// Whether `consumers` is a non-empty list.
    pub fn has_targets(&self) -> bool {
        self.consumers
            .as_ref()
            .and_then(Value::as_array)
            .is_some_and(|names| !names.is_empty())
    }

    /// Consumer names in list order. Non-string entries are skipped.
    pub fn targets(&self) -> Vec<&str> {
        self.consumers
            .as_ref()
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn is_error(&self) -> bool {
        is_error_status(self.status.as_ref())
    }
}

/// An inbound message that did not match a pending RPC call.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Successful service message carrying the action manifest.
    Manifest(Manifest),
    /// Anything else; routed to consumers.
    Push(PushMessage),
}

/// Classify an inbound message by its `msg_type` field.
///
/// A service message reporting status `"error"` is returned as
/// `DceError::Server`, and one whose `data` is not a manifest as
/// `DceError::Client`.
pub fn classify(message: Value) -> DceResult<Inbound> {
    let is_service = message.get("msg_type").and_then(Value::as_str) == Some(SERVICE_MSG_TYPE);
    if !is_service {
        return Ok(Inbound::Push(PushMessage::from_value(message)));
    }

    if is_error_status(message.get("status")) {
        return Err(DceError::server(
            message.get("error"),
            message.get("error_data"),
        ));
    }

    let data = message.get("data").cloned().unwrap_or(Value::Null);
    let manifest = serde_json::from_value::<Manifest>(data)
        .map_err(|e| DceError::client(format!("malformed service manifest: {}", e)))?;
    Ok(Inbound::Manifest(manifest))
}
