//! Callable leaves of the dispatch tree.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::engine::CorrelationEngine;
use crate::error::DceResult;
use crate::protocol::{ActionDescriptor, ActionKind};

/// Pick the call payload out of positional arguments.
///
/// The first structured argument (object or array) wins; with none, the
/// payload is an empty object.
pub fn extract_payload(args: &[Value]) -> Value {
    args.iter()
        .find(|arg| arg.is_object() || arg.is_array())
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()))
}

/// A resolved action bound to the engine that carries it.
#[derive(Debug, Clone)]
pub struct ActionHandle {
    descriptor: ActionDescriptor,
    engine: Arc<CorrelationEngine>,
}

impl ActionHandle {
    pub(crate) fn new(descriptor: ActionDescriptor, engine: Arc<CorrelationEngine>) -> Self {
        Self { descriptor, engine }
    }

    pub fn descriptor(&self) -> &ActionDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn kind(&self) -> ActionKind {
        self.descriptor.kind
    }

    /// Invoke with positional arguments; see [`extract_payload`].
    pub async fn invoke(&self, args: &[Value]) -> DceResult<Value> {
        self.invoke_with(extract_payload(args)).await
    }

    /// Invoke with an explicit payload.
    pub async fn invoke_with(&self, payload: Value) -> DceResult<Value> {
        self.engine
            .call(&self.descriptor.name, self.descriptor.kind, payload)
            .await
    }
}
