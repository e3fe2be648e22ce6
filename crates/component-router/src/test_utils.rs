//! Test utilities: a scripted in-memory transport, recording callbacks and a
//! router harness wired to them.
//!
//! Requires feature: `test-utils` (always available to this crate's tests).

use crate::adapters::{DirectoryDomains, PlaintextCipher, StaticConnectivity};
use crate::channel::wire::{WireRequest, REQUEST_ID_FIELD, RESPONSE_FIELD};
use crate::domain::{Endpoint, RequestFailure, RequestId, Response, RouterConfig};
use crate::ports::{
    Collaborators, ForegroundDispatcher, ForegroundTask, ResponseCallback, Transport,
    TransportConnection, TransportError, TransportEvent,
};
use crate::router::Router;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Directory host used by [`Harness`].
pub const DIRECTORY_HOST: &str = "ds.local";

/// Directory port used by [`Harness`].
pub const DIRECTORY_PORT: u16 = 7000;

// =============================================================================
// Scripted transport
// =============================================================================

/// Transport whose connections are driven by the test.
#[derive(Default)]
pub struct ScriptedTransport {
    connections: Mutex<Vec<ScriptedConnection>>,
    refuse: AtomicBool,
    manual_close: AtomicBool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `open` fail immediately.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// When set, `close()` no longer reports `Disconnected` by itself; the
    /// test calls [`ScriptedConnection::finish_close`].
    pub fn manual_close(&self, manual: bool) {
        self.manual_close.store(manual, Ordering::SeqCst);
    }

    /// Every connection opened so far.
    pub fn connections(&self) -> Vec<ScriptedConnection> {
        self.connections.lock().clone()
    }

    pub fn connections_to(&self, host: &str, port: u16) -> Vec<ScriptedConnection> {
        self.connections
            .lock()
            .iter()
            .filter(|connection| connection.endpoint().host == host && connection.endpoint().port == port)
            .cloned()
            .collect()
    }

    /// Most recent connection to `host:port`.
    pub fn latest_to(&self, host: &str, port: u16) -> Option<ScriptedConnection> {
        self.connections_to(host, port).pop()
    }

    pub fn opened(&self) -> usize {
        self.connections.lock().len()
    }
}

impl Transport for ScriptedTransport {
    fn open(
        &self,
        endpoint: &Endpoint,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportConnection>, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }
        let connection = ScriptedConnection {
            inner: Arc::new(ConnectionInner {
                endpoint: endpoint.clone(),
                events,
                sent: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                auto_disconnect: !self.manual_close.load(Ordering::SeqCst),
            }),
        };
        self.connections.lock().push(connection.clone());
        Ok(Box::new(connection))
    }
}

/// One scripted connection. Clones share state.
#[derive(Clone)]
pub struct ScriptedConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    endpoint: Endpoint,
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: Mutex<Vec<Value>>,
    closed: AtomicBool,
    auto_disconnect: bool,
}

impl ScriptedConnection {
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn accept(&self) {
        self.push(TransportEvent::Connected);
    }

    /// Answer `request_id` with `body`, encoded the way a component does.
    pub fn reply(&self, request_id: RequestId, body: Value) {
        self.push_frame(json!({
            REQUEST_ID_FIELD: request_id,
            RESPONSE_FIELD: body.to_string(),
        }));
    }

    pub fn push_frame(&self, frame: Value) {
        self.push(TransportEvent::Frame(frame));
    }

    /// The remote side closes the connection.
    pub fn drop_connection(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.push(TransportEvent::Disconnected {
            reason: "closed by server".into(),
        });
    }

    /// Complete a client close while `manual_close` is set.
    pub fn finish_close(&self) {
        self.push(TransportEvent::Disconnected {
            reason: "closed by client".into(),
        });
    }

    pub fn fail_connect(&self) {
        self.push(TransportEvent::ConnectError("connection refused".into()));
    }

    pub fn time_out_connect(&self) {
        self.push(TransportEvent::ConnectTimeout);
    }

    /// Frames emitted on this connection, decoded.
    pub fn sent(&self) -> Vec<WireRequest> {
        self.inner
            .sent
            .lock()
            .iter()
            .filter_map(|frame| serde_json::from_value(frame.clone()).ok())
            .collect()
    }

    pub fn sent_ids(&self) -> Vec<RequestId> {
        self.sent().into_iter().map(|frame| frame.reqid).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn push(&self, event: TransportEvent) {
        let _ = self.inner.events.send(event);
    }
}

impl TransportConnection for ScriptedConnection {
    fn emit(&self, frame: Value) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.inner.sent.lock().push(frame);
        Ok(())
    }

    fn close(&self) {
        let already_closed = self.inner.closed.swap(true, Ordering::SeqCst);
        if !already_closed && self.inner.auto_disconnect {
            self.finish_close();
        }
    }
}

// =============================================================================
// Callbacks and foreground
// =============================================================================

/// One delivered outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { request_id: RequestId, body: Value },
    Failure { request_id: RequestId, code: i32, message: String },
}

impl Outcome {
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Success { request_id, .. } | Self::Failure { request_id, .. } => *request_id,
        }
    }
}

/// Callback that records every outcome it receives.
#[derive(Debug, Default)]
pub struct RecordingCallback {
    outcomes: Mutex<Vec<Outcome>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().clone()
    }

    pub fn outcomes_for(&self, request_id: RequestId) -> Vec<Outcome> {
        self.outcomes()
            .into_iter()
            .filter(|outcome| outcome.request_id() == request_id)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.outcomes.lock().len()
    }

    /// `(request id, code)` of every failure.
    pub fn failure_codes(&self) -> Vec<(RequestId, i32)> {
        self.outcomes()
            .into_iter()
            .filter_map(|outcome| match outcome {
                Outcome::Failure { request_id, code, .. } => Some((request_id, code)),
                Outcome::Success { .. } => None,
            })
            .collect()
    }

    pub fn successes(&self) -> Vec<(RequestId, Value)> {
        self.outcomes()
            .into_iter()
            .filter_map(|outcome| match outcome {
                Outcome::Success { request_id, body } => Some((request_id, body)),
                Outcome::Failure { .. } => None,
            })
            .collect()
    }
}

impl ResponseCallback for RecordingCallback {
    fn on_success(&self, response: &Response, request_id: RequestId) {
        self.outcomes.lock().push(Outcome::Success {
            request_id,
            body: response.body.clone(),
        });
    }

    fn on_failure(&self, failure: &RequestFailure, request_id: RequestId) {
        self.outcomes.lock().push(Outcome::Failure {
            request_id,
            code: failure.code,
            message: failure.message.clone(),
        });
    }
}

/// Foreground that runs tasks inline and counts the hops.
#[derive(Debug, Default)]
pub struct ManualForeground {
    active: AtomicBool,
    hops: AtomicUsize,
}

impl ManualForeground {
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
            hops: AtomicUsize::new(0),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Tasks run on the foreground so far.
    pub fn hops(&self) -> usize {
        self.hops.load(Ordering::SeqCst)
    }
}

impl ForegroundDispatcher for ManualForeground {
    fn has_foreground(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn run_on_foreground(&self, task: ForegroundTask) {
        self.hops.fetch_add(1, Ordering::SeqCst);
        task();
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A router wired to scripted collaborators. Must be built inside a tokio
/// runtime.
pub struct Harness {
    pub router: Router,
    pub transport: Arc<ScriptedTransport>,
    pub connectivity: Arc<StaticConnectivity>,
    pub foreground: Arc<ManualForeground>,
}

impl Harness {
    /// Default configuration with an active foreground.
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        let transport = Arc::new(ScriptedTransport::new());
        let connectivity = Arc::new(StaticConnectivity::online());
        let foreground = Arc::new(ManualForeground::new(true));
        let domains = Arc::new(DirectoryDomains::new(DIRECTORY_PORT));
        domains.add_domain(DIRECTORY_HOST);

        let collaborators = Collaborators {
            transport: transport.clone(),
            cipher: Arc::new(PlaintextCipher),
            connectivity: connectivity.clone(),
            foreground: foreground.clone(),
            domains,
        };
        let router = match Router::new(config, collaborators) {
            Ok(router) => router,
            Err(error) => panic!("harness router: {error}"),
        };

        Self {
            router,
            transport,
            connectivity,
            foreground,
        }
    }

    /// Latest connection to the directory service.
    pub fn directory(&self) -> Option<ScriptedConnection> {
        self.transport.latest_to(DIRECTORY_HOST, DIRECTORY_PORT)
    }

    /// Latest connection to `host:port`.
    pub fn connection(&self, host: &str, port: u16) -> Option<ScriptedConnection> {
        self.transport.latest_to(host, port)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Successful directory reply pointing at `host:nport`.
pub fn address_reply(host: &str, nport: i32) -> Value {
    json!({
        "status": 200,
        "componentIp": host,
        "nport": nport,
        "sipPort": 0,
        "isTlsEnabled": false
    })
}

/// Let every spawned pump drain its queue.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
