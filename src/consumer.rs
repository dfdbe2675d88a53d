//! Consumer registry and push routing.
//!
//! Consumers are registered by name before the client connects. Once the
//! client is built the registry is frozen behind an `Arc` and only read.
//!
//! A push message naming consumers is fanned out to every registered name
//! in list order; unknown names are skipped. A push naming nobody is either
//! a request error (status `"error"`) or an unrouted informational message.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{DceError, DceResult};
use crate::protocol::PushMessage;

/// Handler invoked with `(data, error, error_data)` of a push message.
pub type ConsumerFn = dyn Fn(Option<&Value>, Option<&Value>, Option<&Value>) + Send + Sync;

/// A named push consumer.
///
/// Implement this for a struct when a closure registered through
/// [`ConsumerRegistry::register`] is not enough.
pub trait Consumer: Send + Sync + 'static {
    /// Name the server uses to address this consumer.
    fn name(&self) -> &str;

    fn consume(&self, data: Option<&Value>, error: Option<&Value>, error_data: Option<&Value>);
}

/// What happened to a routed push message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handlers invoked (may be zero if every listed name was unknown)
    Delivered(usize),
    /// No consumer list and no error status
    Unrouted,
}

/// Name → handler registry.
#[derive(Default)]
pub struct ConsumerRegistry {
    handlers: HashMap<String, Box<ConsumerFn>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`.
    ///
    /// Names are unique: registering a taken name fails with
    /// `DceError::DuplicateConsumer` and keeps the first handler.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> DceResult<()>
    where
        F: Fn(Option<&Value>, Option<&Value>, Option<&Value>) + Send + Sync + 'static,
    {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(DceError::DuplicateConsumer { name });
        }
        log::debug!(target: "dce::consumer", "Registered consumer {}", name);
        self.handlers.insert(name, Box::new(handler));
        Ok(())
    }

    /// Register a [`Consumer`] under its own name.
    pub fn register_consumer<C: Consumer>(&mut self, consumer: C) -> DceResult<()> {
        let name = consumer.name().to_owned();
        self.register(name, move |data, error, error_data| {
            consumer.consume(data, error, error_data)
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Deliver a push message.
    ///
    /// Handlers run synchronously, one after another, in the order the
    /// message lists them.
    pub fn route(&self, message: &PushMessage) -> DceResult<RouteOutcome> {
        if message.has_targets() {
            let mut delivered = 0;
            for name in message.targets() {
                match self.handlers.get(name) {
                    Some(handler) => {
                        handler(
                            message.data.as_ref(),
                            message.error.as_ref(),
                            message.error_data.as_ref(),
                        );
                        delivered += 1;
                    }
                    None => log::debug!(
                        target: "dce::consumer",
                        "No consumer registered as {}, skipping",
                        name
                    ),
                }
            }
            return Ok(RouteOutcome::Delivered(delivered));
        }

        if message.is_error() {
            return Err(DceError::request(
                message.error.as_ref(),
                message.error_data.as_ref(),
            ));
        }

        log::info!(
            target: "dce::consumer",
            "Unrouted push message: data={}",
            message.data.as_ref().unwrap_or(&Value::Null)
        );
        Ok(RouteOutcome::Unrouted)
    }
}

impl std::fmt::Debug for ConsumerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<(String, Option<Value>, Option<Value>, Option<Value>)>>>;

    fn recording(registry: &mut ConsumerRegistry, name: &str, calls: &Calls) {
        let calls = Arc::clone(calls);
        let tag = name.to_string();
        registry
            .register(name, move |data, error, error_data| {
                calls.lock().unwrap().push((
                    tag.clone(),
                    data.cloned(),
                    error.cloned(),
                    error_data.cloned(),
                ));
            })
            .unwrap();
    }

    #[test]
    fn fan_out_invokes_each_listed_consumer_in_order() {
        let calls = Calls::default();
        let mut registry = ConsumerRegistry::new();
        recording(&mut registry, "Y", &calls);
        recording(&mut registry, "X", &calls);

        let push = PushMessage::from_value(json!({"consumers": ["X", "Y"], "data": {"n": 1}}));
        let outcome = registry.route(&push).unwrap();

        assert_eq!(outcome, RouteOutcome::Delivered(2));
        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                ("X".to_string(), Some(json!({"n": 1})), None, None),
                ("Y".to_string(), Some(json!({"n": 1})), None, None),
            ]
        );
    }

    #[test]
    fn unregistered_names_are_skipped() {
        let calls = Calls::default();
        let mut registry = ConsumerRegistry::new();
        recording(&mut registry, "X", &calls);

        let push = PushMessage::from_value(json!({"consumers": ["Ghost", "X"], "data": 1}));
        assert_eq!(registry.route(&push).unwrap(), RouteOutcome::Delivered(1));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn listed_consumer_receives_error_fields() {
        let calls = Calls::default();
        let mut registry = ConsumerRegistry::new();
        recording(&mut registry, "X", &calls);

        let push = PushMessage::from_value(json!({
            "consumers": ["X"],
            "status": "error",
            "error": "E",
            "error_data": {"f": 1}
        }));
        assert_eq!(registry.route(&push).unwrap(), RouteOutcome::Delivered(1));

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].1, None);
        assert_eq!(calls[0].2, Some(json!("E")));
        assert_eq!(calls[0].3, Some(json!({"f": 1})));
    }

    #[test]
    fn error_push_without_consumers_is_request_error() {
        let registry = ConsumerRegistry::new();
        let push = PushMessage::from_value(json!({
            "consumers": [],
            "status": "error",
            "error": "E",
            "error_data": "ED"
        }));

        match registry.route(&push) {
            Err(DceError::Request { error, error_data }) => {
                assert_eq!(error, "E");
                assert_eq!(error_data, json!("ED"));
            }
            other => panic!("Expected Request error, got {other:?}"),
        }
    }

    #[test]
    fn ok_push_without_consumers_is_unrouted() {
        let registry = ConsumerRegistry::new();
        let push = PushMessage::from_value(json!({"consumers": [], "status": "ok", "data": 1}));
        assert_eq!(registry.route(&push).unwrap(), RouteOutcome::Unrouted);
    }

    #[test]
    fn duplicate_name_is_rejected_and_first_handler_kept() {
        let calls = Calls::default();
        let mut registry = ConsumerRegistry::new();
        recording(&mut registry, "X", &calls);

        let err = registry.register("X", |_, _, _| panic!("second handler must not run"));
        assert!(matches!(err, Err(DceError::DuplicateConsumer { ref name }) if name == "X"));

        let push = PushMessage::from_value(json!({"consumers": ["X"], "data": 1}));
        registry.route(&push).unwrap();
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    struct Counter {
        hits: Arc<Mutex<usize>>,
    }

    impl Consumer for Counter {
        fn name(&self) -> &str {
            "Counter"
        }

        fn consume(&self, _data: Option<&Value>, _error: Option<&Value>, _error_data: Option<&Value>) {
            *self.hits.lock().unwrap() += 1;
        }
    }

    #[test]
    fn trait_consumer_registers_under_its_name() {
        let hits = Arc::new(Mutex::new(0));
        let mut registry = ConsumerRegistry::new();
        registry
            .register_consumer(Counter {
                hits: Arc::clone(&hits),
            })
            .unwrap();

        assert_eq!(registry.names(), vec!["Counter"]);
        let push = PushMessage::from_value(json!({"consumers": ["Counter", "Counter"]}));
        assert_eq!(registry.route(&push).unwrap(), RouteOutcome::Delivered(2));
        assert_eq!(*hits.lock().unwrap(), 2);
    }
}
