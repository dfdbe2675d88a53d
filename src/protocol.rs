//! Wire protocol for the command/event channel.
//!
//! ## Module Structure
//!
//! - `request_id` - RequestId type carried as `cmd_id` on RPC traffic
//! - `message` - Outbound message shapes, manifest types and inbound classification
//! - `codec` - JSON encode/decode of text frames

mod codec;
mod message;
mod request_id;

pub use codec::{decode, encode};
pub use message::{
    ActionDescriptor, ActionKind, FireMessage, Inbound, Manifest, OutboundMessage, PushMessage,
    RpcRequest, classify, is_error_status,
};
pub use request_id::RequestId;
