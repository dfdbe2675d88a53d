//! Client façade: builder, connection ownership and the dotted call surface.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::ResolvedConfig;
use crate::consumer::{Consumer, ConsumerRegistry};
use crate::dispatch::ActionHandle;
use crate::engine::{ConnectionState, CorrelationEngine};
use crate::error::{DceError, DceResult};
use crate::protocol::ActionDescriptor;
use crate::readiness::{
    DEFAULT_OPEN_POLL_INTERVAL, DEFAULT_READY_POLL_INTERVAL, MIN_POLL_INTERVAL,
};
use crate::session::{ErrorHook, ReaderTaskHandle, Session, spawn_reader_task};
use crate::transport::{Transport, websocket};

/// Configures consumers and timing, then connects.
///
/// Consumers can only be registered here; once connected the registry is
/// frozen.
pub struct ClientBuilder {
    consumers: ConsumerRegistry,
    error_hook: Option<ErrorHook>,
    debug: bool,
    open_poll_interval: Duration,
    ready_poll_interval: Duration,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            consumers: ConsumerRegistry::new(),
            error_hook: None,
            debug: false,
            open_poll_interval: DEFAULT_OPEN_POLL_INTERVAL,
            ready_poll_interval: DEFAULT_READY_POLL_INTERVAL,
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a push consumer. Fails if `name` is taken.
    pub fn consumer<F>(mut self, name: impl Into<String>, handler: F) -> DceResult<Self>
    where
        F: Fn(Option<&Value>, Option<&Value>, Option<&Value>) + Send + Sync + 'static,
    {
        self.consumers.register(name, handler)?;
        Ok(self)
    }

    /// Register a [`Consumer`] under its own name. Fails if the name is taken.
    pub fn register_consumer<C: Consumer>(mut self, consumer: C) -> DceResult<Self> {
        self.consumers.register_consumer(consumer)?;
        Ok(self)
    }

    /// Send fatal inbound errors to `hook` instead of closing the connection.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(DceError) + Send + Sync + 'static,
    {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    /// Log connection lifecycle and manifest contents at info level.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Intervals below one millisecond are raised to one.
    pub fn open_poll_interval(mut self, interval: Duration) -> Self {
        self.open_poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Intervals below one millisecond are raised to one.
    pub fn ready_poll_interval(mut self, interval: Duration) -> Self {
        self.ready_poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Take debug flag and poll intervals from resolved configuration.
    pub fn config(self, config: &ResolvedConfig) -> Self {
        self.debug(config.debug)
            .open_poll_interval(config.open_poll_interval)
            .ready_poll_interval(config.ready_poll_interval)
    }

    /// Connect to the configured WebSocket endpoint.
    ///
    /// Returns at once; the connection opens in the background. Must be
    /// called from within a tokio runtime.
    pub fn connect(self, config: &ResolvedConfig) -> DceClient {
        let transport = websocket::connect(&config.socket_url);
        self.config(config).with_transport(transport)
    }

    /// Run a client over an already created transport.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_transport(self, transport: Transport) -> DceClient {
        let engine = Arc::new(CorrelationEngine::new(
            transport.outgoing.clone(),
            self.open_poll_interval,
        ));
        let session = Arc::new(Session::new(
            engine,
            Arc::new(self.consumers),
            self.ready_poll_interval,
            self.debug,
        ));
        let reader = spawn_reader_task(Arc::clone(&session), transport, self.error_hook);
        DceClient { session, reader }
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("consumers", &self.consumers)
            .field("has_error_hook", &self.error_hook.is_some())
            .field("debug", &self.debug)
            .field("open_poll_interval", &self.open_poll_interval)
            .field("ready_poll_interval", &self.ready_poll_interval)
            .finish()
    }
}

/// A connected command/event client.
///
/// Dropping the client closes the connection.
///
/// ```ignore
/// let client = ClientBuilder::new()
///     .consumer("Chat", |data, _, _| println!("{data:?}"))?
///     .connect(&config);
/// let invoice = client
///     .call("billing.invoice.create", &[json!({"amount": 10})])
///     .await?;
/// ```
pub struct DceClient {
    session: Arc<Session>,
    reader: ReaderTaskHandle,
}

impl DceClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Call the action at `path` once the manifest has arrived.
    ///
    /// The payload is the first object or array in `args` (an empty object
    /// when there is none). RPC actions resolve with the reply's `data`;
    /// fire-and-forget actions resolve with null once sent.
    pub async fn call(&self, path: &str, args: &[Value]) -> DceResult<Value> {
        self.action(path).await?.invoke(args).await
    }

    /// Resolve `path` to a callable handle once the manifest has arrived.
    pub async fn action(&self, path: &str) -> DceResult<ActionHandle> {
        self.session.action(path).await
    }

    /// Wait for the manifest.
    pub async fn ready(&self) {
        self.session.wait_ready().await;
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.connection_state()
    }

    /// Version reported by the manifest, once received.
    pub fn manifest_version(&self) -> Option<Value> {
        self.session.manifest_version().cloned()
    }

    /// Installed actions, empty before the manifest arrives.
    pub fn actions(&self) -> Vec<ActionDescriptor> {
        self.session
            .tree()
            .map(|tree| tree.actions().into_iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of registered consumers.
    pub fn consumer_names(&self) -> Vec<String> {
        self.session
            .consumers()
            .names()
            .into_iter()
            .map(str::to_owned)
            .collect()
    }

    pub fn engine(&self) -> &Arc<CorrelationEngine> {
        self.session.engine()
    }

    /// Wait until the connection is closed.
    ///
    /// Returns the fatal inbound error that closed it, if any. Only the
    /// first caller receives the error.
    pub async fn closed(&self) -> DceResult<()> {
        self.reader.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_stopped()
    }
}

impl std::fmt::Debug for DceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DceClient")
            .field("session", &self.session)
            .field("closed", &self.is_closed())
            .finish()
    }
}
