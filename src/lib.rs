//! Command/event client for DCEngine services over a single WebSocket.
//!
//! One connection carries correlated RPC calls, fire-and-forget commands and
//! server push messages. Calls are deferred until the connection is open and
//! the server has announced its actions in a service manifest.

pub mod client;
pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod readiness;
mod session;
pub mod transport;

pub use client::{ClientBuilder, DceClient};
pub use config::{ClientSettings, ResolvedConfig};
pub use consumer::{Consumer, ConsumerRegistry, RouteOutcome};
pub use dispatch::{ActionHandle, DispatchTree};
pub use engine::ConnectionState;
pub use error::{DceError, DceResult};
pub use protocol::{ActionDescriptor, ActionKind};
