//! Inbound message handling for one client connection.
//!
//! A `Session` ties the correlation engine, the consumer registry and the
//! manifest-derived dispatch tree together. The reader task feeds it every
//! transport event; callers resolve actions through it.
//!
//! ## Module Structure
//!
//! - `reader` - background task draining transport events into the session

mod reader;

pub(crate) use reader::{ErrorHook, ReaderTaskHandle, spawn_reader_task};

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use log::Level;
use serde_json::Value;

use crate::consumer::{ConsumerRegistry, RouteOutcome};
use crate::dispatch::{ActionHandle, DispatchTree};
use crate::engine::{ConnectionState, CorrelationEngine, RouteResult};
use crate::error::{DceError, DceResult};
use crate::protocol::{Inbound, Manifest, RequestId, classify, decode};
use crate::readiness::{ReadinessBarrier, ReadinessFlag};

/// What a single inbound frame turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    /// Correlated reply, delivered or dropped
    Reply(RouteResult),
    /// Service manifest; `installed` is false for a repeat manifest
    Manifest { installed: bool },
    /// Push message handed to the consumer registry
    Push(RouteOutcome),
}

/// Dispatch tree together with the manifest version it came from.
#[derive(Debug)]
struct InstalledManifest {
    tree: DispatchTree,
    version: Value,
}

pub(crate) struct Session {
    engine: Arc<CorrelationEngine>,
    consumers: Arc<ConsumerRegistry>,
    /// Set exactly once, by the first manifest
    dispatch: OnceLock<InstalledManifest>,
    ready: ReadinessFlag,
    ready_barrier: ReadinessBarrier,
    debug: bool,
}

impl Session {
    pub(crate) fn new(
        engine: Arc<CorrelationEngine>,
        consumers: Arc<ConsumerRegistry>,
        ready_poll_interval: Duration,
        debug: bool,
    ) -> Self {
        Self {
            engine,
            consumers,
            dispatch: OnceLock::new(),
            ready: ReadinessFlag::new(),
            ready_barrier: ReadinessBarrier::new("manifest", ready_poll_interval),
            debug,
        }
    }

    pub(crate) fn engine(&self) -> &Arc<CorrelationEngine> {
        &self.engine
    }

    pub(crate) fn consumers(&self) -> &ConsumerRegistry {
        &self.consumers
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.is_set()
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        self.engine.state()
    }

    pub(crate) fn tree(&self) -> Option<&DispatchTree> {
        self.dispatch.get().map(|installed| &installed.tree)
    }

    pub(crate) fn manifest_version(&self) -> Option<&Value> {
        self.dispatch.get().map(|installed| &installed.version)
    }

    /// Level for connection lifecycle and manifest diagnostics.
    fn lifecycle_level(&self) -> Level {
        if self.debug { Level::Info } else { Level::Debug }
    }

    /// Wait for the manifest.
    pub(crate) async fn wait_ready(&self) {
        self.ready_barrier.wait_until(|| self.ready.is_set()).await;
    }

    /// Resolve a dotted path once the manifest is installed.
    pub(crate) async fn action(&self, path: &str) -> DceResult<ActionHandle> {
        self.ready_barrier
            .run(
                || self.ready.is_set(),
                || async { self.resolve_now(path) },
            )
            .await
    }

    /// Resolve a dotted path against the installed tree without waiting.
    pub(crate) fn resolve_now(&self, path: &str) -> DceResult<ActionHandle> {
        let tree = self
            .tree()
            .ok_or_else(|| DceError::client("service manifest not received yet"))?;
        let descriptor = tree.resolve_path(path)?;
        Ok(ActionHandle::new(descriptor.clone(), Arc::clone(&self.engine)))
    }

    pub(crate) fn on_open(&self) {
        if self.engine.set_state(ConnectionState::Open) {
            log::log!(target: "dce::session", self.lifecycle_level(), "Socket opened");
        }
    }

    pub(crate) fn on_close(&self, reason: Option<&str>) {
        if self.engine.set_state(ConnectionState::Closed) {
            log::log!(
                target: "dce::session",
                self.lifecycle_level(),
                "Socket closed: {}",
                reason.unwrap_or("no reason given")
            );
        }
        let abandoned = self.engine.fail_pending();
        if abandoned > 0 {
            log::warn!(
                target: "dce::session",
                "Connection closed with {} call(s) awaiting a reply",
                abandoned
            );
        }
    }

    /// Process one inbound text frame.
    ///
    /// A frame carrying `cmd_id` is a reply and goes to the pending table
    /// only. Everything else is classified: a service message installs the
    /// manifest, anything else is routed to consumers.
    pub(crate) fn handle_frame(&self, frame: &str) -> DceResult<FrameOutcome> {
        let message: Value = decode(frame)?;

        if let Some(id) = RequestId::from_json(&message) {
            return Ok(FrameOutcome::Reply(self.engine.route_reply(id, message)));
        }

        match classify(message)? {
            Inbound::Manifest(manifest) => Ok(FrameOutcome::Manifest {
                installed: self.install_manifest(manifest),
            }),
            Inbound::Push(push) => Ok(FrameOutcome::Push(self.consumers.route(&push)?)),
        }
    }

    /// Build the dispatch tree from the first manifest and raise readiness.
    ///
    /// Later manifests are ignored.
    pub(crate) fn install_manifest(&self, manifest: Manifest) -> bool {
        if self.dispatch.get().is_some() {
            log::warn!(
                target: "dce::session",
                "Ignoring repeated service manifest (version {})",
                manifest.version
            );
            return false;
        }

        let level = self.lifecycle_level();
        for descriptor in &manifest.actions {
            log::log!(target: "dce::session", level, "{}", descriptor.summary());
        }

        let installed = InstalledManifest {
            tree: DispatchTree::build(&manifest.actions),
            version: manifest.version,
        };
        let version = installed.version.clone();
        if self.dispatch.set(installed).is_err() {
            return false;
        }
        self.ready.set();
        log::log!(
            target: "dce::session",
            level,
            "Service manifest installed: {} action(s), version {}",
            manifest.actions.len(),
            version
        );
        true
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("engine", &self.engine)
            .field("consumers", &self.consumers)
            .field("ready", &self.is_ready())
            .field("debug", &self.debug)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ActionDescriptor, ActionKind};
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    fn session_with(consumers: ConsumerRegistry) -> (Arc<Session>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        let engine = Arc::new(CorrelationEngine::new(tx, Duration::from_millis(1000)));
        let session = Session::new(
            engine,
            Arc::new(consumers),
            Duration::from_millis(500),
            false,
        );
        (Arc::new(session), rx)
    }

    fn manifest_frame() -> String {
        json!({
            "msg_type": "service",
            "status": "ok",
            "data": {
                "actions": [{"name": "a.b", "type": "rpc"}, {"name": "c", "type": "fire"}],
                "version": "1.0"
            }
        })
        .to_string()
    }

    #[test]
    fn manifest_frame_installs_tree_and_sets_ready() {
        let (session, _rx) = session_with(ConsumerRegistry::new());
        assert!(!session.is_ready());

        let outcome = session.handle_frame(&manifest_frame()).unwrap();

        assert_eq!(outcome, FrameOutcome::Manifest { installed: true });
        assert!(session.is_ready());
        assert_eq!(session.manifest_version(), Some(&json!("1.0")));
        assert_eq!(
            session.resolve_now("a.b").unwrap().descriptor(),
            &ActionDescriptor::new("a.b", ActionKind::Rpc)
        );
    }

    #[test]
    fn repeated_manifest_is_ignored() {
        let (session, _rx) = session_with(ConsumerRegistry::new());
        session.handle_frame(&manifest_frame()).unwrap();

        let second = json!({
            "msg_type": "service",
            "data": {"actions": [{"name": "other", "type": "rpc"}], "version": "2.0"}
        });
        let outcome = session.handle_frame(&second.to_string()).unwrap();

        assert_eq!(outcome, FrameOutcome::Manifest { installed: false });
        assert!(session.is_ready());
        assert_eq!(session.manifest_version(), Some(&json!("1.0")));
        assert!(session.resolve_now("other").is_err());
    }

    #[test]
    fn resolve_before_manifest_is_client_error() {
        let (session, _rx) = session_with(ConsumerRegistry::new());
        assert!(matches!(
            session.resolve_now("a.b"),
            Err(DceError::Client { .. })
        ));
    }

    #[test]
    fn reply_without_waiter_is_dropped_not_pushed() {
        let hits = Arc::new(Mutex::new(0));
        let mut consumers = ConsumerRegistry::new();
        let counter = Arc::clone(&hits);
        consumers
            .register("X", move |_, _, _| *counter.lock().unwrap() += 1)
            .unwrap();
        let (session, _rx) = session_with(consumers);

        let outcome = session
            .handle_frame(r#"{"cmd_id": "7", "consumers": ["X"], "data": 1}"#)
            .unwrap();

        assert_eq!(outcome, FrameOutcome::Reply(RouteResult::NoWaiter));
        assert_eq!(*hits.lock().unwrap(), 0);
    }

    #[test]
    fn push_frame_reaches_consumer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut consumers = ConsumerRegistry::new();
        let sink = Arc::clone(&seen);
        consumers
            .register("Chat", move |data, _, _| {
                sink.lock().unwrap().push(data.cloned());
            })
            .unwrap();
        let (session, _rx) = session_with(consumers);

        let outcome = session
            .handle_frame(r#"{"consumers": ["Chat"], "data": {"text": "hi"}}"#)
            .unwrap();

        assert_eq!(outcome, FrameOutcome::Push(RouteOutcome::Delivered(1)));
        assert_eq!(*seen.lock().unwrap(), vec![Some(json!({"text": "hi"}))]);
    }

    #[test]
    fn service_error_frame_is_server_error() {
        let (session, _rx) = session_with(ConsumerRegistry::new());
        let err = session
            .handle_frame(r#"{"msg_type": "service", "status": "error", "error": "boom"}"#)
            .unwrap_err();
        assert!(matches!(err, DceError::Server { ref error, .. } if error == "boom"));
        assert!(!session.is_ready());
    }

    #[test]
    fn undecodable_frame_is_client_error() {
        let (session, _rx) = session_with(ConsumerRegistry::new());
        let err = session.handle_frame("not json").unwrap_err();
        assert!(err.to_string().contains("response json parse error"));
    }

    #[test]
    fn open_then_close_settles_connection_state() {
        let (session, _rx) = session_with(ConsumerRegistry::new());
        session.on_open();
        assert_eq!(session.connection_state(), ConnectionState::Open);
        session.on_close(Some("bye"));
        assert_eq!(session.connection_state(), ConnectionState::Closed);
        session.on_open();
        assert_eq!(session.connection_state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn action_waits_for_manifest() {
        let (session, _rx) = session_with(ConsumerRegistry::new());

        let waiter = Arc::clone(&session);
        let lookup = tokio::spawn(async move { waiter.action("c").await.map(|h| h.kind()) });

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(!lookup.is_finished());

        session.handle_frame(&manifest_frame()).unwrap();
        assert_eq!(lookup.await.unwrap().unwrap(), ActionKind::FireAndForget);
    }
}
