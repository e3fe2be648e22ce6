//! # Transport Channel
//!
//! Wraps one physical connection to one component endpoint. The channel
//! encodes requests, decodes responses, owns the deadlines of requests sent
//! on it, and reports everything upward as [`ChannelEvent`]s on an unbounded
//! queue. It never calls into its owner.

mod status;
mod timeout;
pub mod wire;

#[cfg(test)]
mod tests;

pub use status::ChannelStatus;

use crate::domain::{codes, Endpoint, ErrorMessages, PendingRequest, RequestFailure, RequestId, Response};
use crate::ports::{PayloadCipher, Transport, TransportConnection, TransportEvent};
use parking_lot::Mutex;
use serde_json::Value;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use timeout::TimeoutScheduler;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Events a channel reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Response(Response),
    /// `request_id` is `None` for failures scoped to the whole channel.
    Failure {
        request_id: Option<RequestId>,
        failure: RequestFailure,
    },
}

/// Settings shared by every channel of a router.
#[derive(Clone)]
pub struct ChannelOptions {
    pub has_salt: bool,
    pub cipher: Arc<dyn PayloadCipher>,
    pub messages: Arc<ErrorMessages>,
}

/// Cloneable handle to a channel.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<ChannelShared>,
}

struct ChannelShared {
    component: String,
    endpoint: Endpoint,
    options: ChannelOptions,
    runtime: Handle,
    events: mpsc::UnboundedSender<ChannelEvent>,
    timeouts: TimeoutScheduler,
    state: Mutex<ChannelState>,
}

struct ChannelState {
    status: ChannelStatus,
    disconnected_by_app: bool,
    connection: Option<Box<dyn TransportConnection>>,
    pump: Option<JoinHandle<()>>,
}

impl Channel {
    pub fn new(
        component: impl Into<String>,
        endpoint: Endpoint,
        options: ChannelOptions,
        runtime: Handle,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        let component = component.into();
        let timeouts = TimeoutScheduler::spawn(
            &runtime,
            component.clone(),
            options.messages.failure(codes::REQUEST_TIMEOUT),
            events.clone(),
        );
        Self {
            shared: Arc::new(ChannelShared {
                component,
                endpoint,
                options,
                runtime,
                events,
                timeouts,
                state: Mutex::new(ChannelState {
                    status: ChannelStatus::None,
                    disconnected_by_app: false,
                    connection: None,
                    pump: None,
                }),
            }),
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.shared.state.lock().status
    }

    pub fn is_disconnected_by_app(&self) -> bool {
        self.shared.state.lock().disconnected_by_app
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// Open the physical connection. Progress arrives as events; a transport
    /// that cannot even start reports a connection error right away.
    pub fn connect(&self, transport: &dyn Transport) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.status != ChannelStatus::None {
            warn!(component = %shared.component, status = %state.status, "channel already used");
            return;
        }
        state.status = ChannelStatus::Connecting;

        let (sender, receiver) = mpsc::unbounded_channel();
        match transport.open(&shared.endpoint, sender) {
            Ok(connection) => {
                state.connection = Some(connection);
                state.pump = Some(
                    shared
                        .runtime
                        .spawn(pump(Arc::downgrade(shared), receiver)),
                );
                debug!(component = %shared.component, endpoint = %shared.endpoint, "channel connecting");
            }
            Err(error) => {
                state.status = ChannelStatus::Failed;
                drop(state);
                warn!(
                    component = %shared.component,
                    endpoint = %shared.endpoint,
                    error = %error,
                    "transport could not be opened"
                );
                shared.emit(ChannelEvent::Failure {
                    request_id: None,
                    failure: shared.options.messages.failure(codes::CONNECTION_ERROR),
                });
            }
        }
    }

    /// Encode and transmit `request`, starting its deadline.
    pub fn send(&self, request: &PendingRequest) -> Result<(), RequestFailure> {
        let shared = &self.shared;
        let frame = wire::encode_request(request, shared.options.has_salt, shared.options.cipher.as_ref())
            .map_err(|error| {
                warn!(
                    component = %shared.component,
                    request_id = request.request_id,
                    error = %error,
                    "cannot encode request"
                );
                shared.options.messages.failure(codes::REQUEST_ERROR)
            })?;

        let state = shared.state.lock();
        let connection = match &state.connection {
            Some(connection) if state.status.accepts_sends() => connection,
            _ => {
                debug!(component = %shared.component, status = %state.status, "channel not accepting sends");
                return Err(shared.options.messages.failure(codes::NETWORK_ERROR));
            }
        };

        shared.timeouts.schedule(request.request_id, request.timeout);
        if let Err(error) = connection.emit(frame) {
            shared.timeouts.cancel(request.request_id);
            warn!(
                component = %shared.component,
                request_id = request.request_id,
                error = %error,
                "transmission failed"
            );
            return Err(shared.options.messages.failure(codes::NETWORK_ERROR));
        }

        debug!(
            component = %shared.component,
            request_id = request.request_id,
            rpc = %request.rpc,
            "request sent"
        );
        Ok(())
    }

    /// Application-initiated disconnect. A `Disconnected` event follows.
    pub fn disconnect(&self) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        state.disconnected_by_app = true;
        if state.status.is_terminal() {
            debug!(component = %shared.component, "channel already closed");
            return;
        }
        match &state.connection {
            Some(connection) => {
                connection.close();
                state.status = ChannelStatus::Disconnecting;
                info!(component = %shared.component, "channel disconnecting");
            }
            None => debug!(component = %shared.component, "channel has no connection"),
        }
    }

    /// Drop the connection, deadlines and event pump without reporting
    /// anything. The channel cannot be used afterwards.
    pub fn release(&self) {
        let shared = &self.shared;
        let (connection, pump) = {
            let mut state = shared.state.lock();
            state.disconnected_by_app = true;
            if !state.status.is_terminal() {
                state.status = ChannelStatus::Disconnected;
            }
            (state.connection.take(), state.pump.take())
        };
        shared.timeouts.clear();
        if let Some(connection) = connection {
            connection.close();
        }
        if let Some(pump) = pump {
            pump.abort();
        }
    }
}

impl ChannelShared {
    fn emit(&self, event: ChannelEvent) {
        if self.events.send(event).is_err() {
            debug!(component = %self.component, "channel owner gone");
        }
    }

    fn on_transport_event(&self, event: TransportEvent) -> ControlFlow<()> {
        match event {
            TransportEvent::Connected => {
                {
                    let mut state = self.state.lock();
                    if state.status != ChannelStatus::Connecting {
                        debug!(component = %self.component, status = %state.status, "ignoring late connect");
                        return ControlFlow::Continue(());
                    }
                    state.status = ChannelStatus::Connected;
                }
                info!(component = %self.component, endpoint = %self.endpoint, "channel connected");
                self.emit(ChannelEvent::Connected);
                ControlFlow::Continue(())
            }
            TransportEvent::Frame(frame) => {
                self.on_frame(frame);
                ControlFlow::Continue(())
            }
            TransportEvent::Disconnected { reason } => {
                self.teardown(ChannelStatus::Disconnected, false);
                info!(component = %self.component, reason = %reason, "channel disconnected");
                self.emit(ChannelEvent::Disconnected);
                ControlFlow::Break(())
            }
            TransportEvent::ConnectError(reason) => {
                self.teardown(ChannelStatus::Failed, true);
                warn!(component = %self.component, endpoint = %self.endpoint, reason = %reason, "connection failed");
                self.emit(ChannelEvent::Failure {
                    request_id: None,
                    failure: self.options.messages.failure(codes::CONNECTION_ERROR),
                });
                ControlFlow::Break(())
            }
            TransportEvent::ConnectTimeout => {
                self.teardown(ChannelStatus::Failed, true);
                warn!(component = %self.component, endpoint = %self.endpoint, "connection timed out");
                self.emit(ChannelEvent::Failure {
                    request_id: None,
                    failure: self.options.messages.failure(codes::CONNECTION_TIMEOUT),
                });
                ControlFlow::Break(())
            }
        }
    }

    fn on_frame(&self, frame: Value) {
        let Some(request_id) = wire::response_id(&frame) else {
            warn!(component = %self.component, "response without a valid request id");
            self.emit(ChannelEvent::Failure {
                request_id: None,
                failure: self.options.messages.failure(codes::RESPONSE_ERROR),
            });
            return;
        };

        self.timeouts.cancel(request_id);
        match wire::decode_body(frame, self.options.cipher.as_ref()) {
            Ok(body) => self.emit(ChannelEvent::Response(Response::new(request_id, body))),
            Err(error) => {
                warn!(component = %self.component, request_id, error = %error, "cannot decode response");
                self.emit(ChannelEvent::Failure {
                    request_id: Some(request_id),
                    failure: self.options.messages.failure(codes::RESPONSE_ERROR),
                });
            }
        }
    }

    fn teardown(&self, status: ChannelStatus, close: bool) {
        let connection = {
            let mut state = self.state.lock();
            state.status = status;
            // Detach; this runs on the pump itself.
            state.pump.take();
            state.connection.take()
        };
        self.timeouts.clear();
        if let (true, Some(connection)) = (close, connection) {
            connection.close();
        }
    }
}

async fn pump(channel: Weak<ChannelShared>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = events.recv().await {
        let Some(shared) = channel.upgrade() else {
            break;
        };
        if shared.on_transport_event(event).is_break() {
            break;
        }
    }
}
