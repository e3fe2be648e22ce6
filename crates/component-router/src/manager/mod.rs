//! # Component Connection Manager
//!
//! Owns the channel to one component and the requests accepted for it. The
//! manager buffers requests until its channel connects, correlates responses
//! and failures back to their callbacks, and reports disconnection to the
//! router as a [`ManagerEvent`].


use crate::channel::{Channel, ChannelEvent, ChannelOptions, ChannelStatus};
use crate::domain::{codes, ComponentAddress, ErrorMessages, PendingRequest, RequestFailure, RequestId, Response};
use crate::ports::Transport;
use crate::router::delivery::{Deliveries, DeliveryPolicy, Route};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Services shared by the router and every manager it creates.
pub(crate) struct ManagerContext {
    pub(crate) runtime: Handle,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) channel_options: ChannelOptions,
    pub(crate) delivery: DeliveryPolicy,
}

impl ManagerContext {
    pub(crate) fn messages(&self) -> &ErrorMessages {
        &self.channel_options.messages
    }
}

/// Reported by a manager when its channel goes away.
#[derive(Debug)]
pub(crate) enum ManagerEvent {
    Disconnected {
        component: String,
        manager_id: u64,
        /// Channel-level error, if the channel failed rather than closed
        failure: Option<RequestFailure>,
        /// Requests waiting for a reconnect after an app-initiated disconnect
        resume: Option<Resume>,
    },
}

/// Requests to re-submit to a fresh manager for the same address.
#[derive(Debug)]
pub(crate) struct Resume {
    pub(crate) address: ComponentAddress,
    pub(crate) requests: Vec<PendingRequest>,
}

/// Cloneable handle to a component's manager.
#[derive(Clone)]
pub(crate) struct ComponentManager {
    shared: Arc<ManagerShared>,
}

struct ManagerShared {
    id: u64,
    component: String,
    directory: bool,
    context: Arc<ManagerContext>,
    router: mpsc::UnboundedSender<ManagerEvent>,
    state: Mutex<ManagerState>,
}

#[derive(Default)]
struct ManagerState {
    address: Option<ComponentAddress>,
    channel: Option<Channel>,
    /// Bumped for every channel; events from older channels are ignored.
    generation: u64,
    requests: HashMap<RequestId, PendingRequest>,
    /// Ids already written to the current channel
    sent: HashSet<RequestId>,
    reconnect_requested: bool,
}

impl ComponentManager {
    pub(crate) fn new(
        id: u64,
        component: impl Into<String>,
        address: Option<ComponentAddress>,
        directory: bool,
        context: Arc<ManagerContext>,
        router: mpsc::UnboundedSender<ManagerEvent>,
    ) -> Self {
        Self {
            shared: Arc::new(ManagerShared {
                id,
                component: component.into(),
                directory,
                context,
                router,
                state: Mutex::new(ManagerState {
                    address,
                    ..ManagerState::default()
                }),
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.shared.id
    }

    pub(crate) fn is_directory(&self) -> bool {
        self.shared.directory
    }

    pub(crate) fn has_channel(&self) -> bool {
        self.shared.state.lock().channel.is_some()
    }

    pub(crate) fn channel_status(&self) -> Option<ChannelStatus> {
        self.shared.state.lock().channel.as_ref().map(Channel::status)
    }

    /// A channel that is connected or still connecting.
    pub(crate) fn is_usable(&self) -> bool {
        matches!(
            self.channel_status(),
            Some(ChannelStatus::Connecting | ChannelStatus::Connected)
        )
    }

    pub(crate) fn contains(&self, request_id: RequestId) -> bool {
        self.shared.state.lock().requests.contains_key(&request_id)
    }

    pub(crate) fn buffered(&self) -> usize {
        self.shared.state.lock().requests.len()
    }

    /// True when a buffered request may deliver without a foreground.
    pub(crate) fn any_background_task(&self) -> bool {
        let state = self.shared.state.lock();
        state
            .requests
            .keys()
            .any(|id| self.shared.context.delivery.is_background(*id))
    }

    /// Accept `request`. Immediate outcomes are pushed to `out`.
    pub(crate) fn send(&self, request: PendingRequest, out: &mut Deliveries) {
        let shared = &self.shared;
        let request_id = request.request_id;
        let mut state = shared.state.lock();

        if state.requests.contains_key(&request_id) {
            warn!(component = %shared.component, request_id, "duplicate request id ignored");
            return;
        }
        state.requests.insert(request_id, request);

        let Some(address) = state.address.clone() else {
            error!(component = %shared.component, "no address known, failing buffered requests");
            let failure = shared.context.messages().failure(codes::NETWORK_ERROR);
            let requests = drain(&mut state);
            drop(state);
            out.fail_all(self.route(), requests, failure);
            self.report(None, None);
            return;
        };

        let Some(channel) = state.channel.clone() else {
            self.open_channel(&mut state, &address, out);
            return;
        };

        match channel.status() {
            ChannelStatus::Connected => self.forward(&mut state, &channel, request_id, out),
            ChannelStatus::None | ChannelStatus::Connecting => {
                debug!(component = %shared.component, request_id, "waiting for channel");
            }
            ChannelStatus::Disconnecting if channel.is_disconnected_by_app() => {
                debug!(component = %shared.component, request_id, "reconnect requested");
                state.reconnect_requested = true;
            }
            ChannelStatus::Disconnected if channel.is_disconnected_by_app() => {
                info!(component = %shared.component, "reconnecting after app disconnect");
                self.open_channel(&mut state, &address, out);
            }
            status => {
                error!(component = %shared.component, request_id, status = %status, "channel unusable");
                if let Some(request) = state.requests.remove(&request_id) {
                    let failure = shared.context.messages().failure(codes::NETWORK_ERROR);
                    out.fail(self.route(), request, failure);
                }
            }
        }
    }

    /// Application-initiated disconnect of the channel.
    pub(crate) fn disconnect(&self) {
        let channel = self.shared.state.lock().channel.clone();
        match channel {
            Some(channel) => channel.disconnect(),
            None => debug!(component = %self.shared.component, "no channel to disconnect"),
        }
    }

    /// Release the channel, forget the address and hand back whatever was
    /// still buffered. The manager is unusable afterwards.
    pub(crate) fn clear(&self) -> Vec<PendingRequest> {
        let (channel, leftovers) = {
            let mut state = self.shared.state.lock();
            state.address = None;
            state.reconnect_requested = false;
            state.generation += 1;
            (state.channel.take(), drain(&mut state))
        };
        if let Some(channel) = channel {
            channel.release();
        }
        debug!(
            component = %self.shared.component,
            manager_id = self.shared.id,
            leftovers = leftovers.len(),
            "manager cleared"
        );
        leftovers
    }

    /// Clear the manager and fail anything it still held with NETWORK_ERROR.
    pub(crate) fn teardown(&self, out: &mut Deliveries) {
        let leftovers = self.clear();
        let failure = self.shared.context.messages().failure(codes::NETWORK_ERROR);
        out.fail_all(self.route(), leftovers, failure);
    }

    fn route(&self) -> Route {
        if self.shared.directory {
            Route::Direct
        } else {
            Route::Policy
        }
    }

    fn open_channel(&self, state: &mut ManagerState, address: &ComponentAddress, out: &mut Deliveries) {
        let shared = &self.shared;
        let Some(endpoint) = address.endpoint() else {
            error!(component = %shared.component, "address has no usable endpoint");
            let failure = shared.context.messages().failure(codes::NETWORK_ERROR);
            out.fail_all(self.route(), drain(state), failure);
            return;
        };

        state.generation += 1;
        state.sent.clear();
        state.reconnect_requested = false;

        let (sender, receiver) = mpsc::unbounded_channel();
        let channel = Channel::new(
            shared.component.clone(),
            endpoint,
            shared.context.channel_options.clone(),
            shared.context.runtime.clone(),
            sender,
        );
        if let Some(previous) = state.channel.replace(channel.clone()) {
            previous.release();
        }
        self.spawn_pump(state.generation, receiver);

        info!(component = %shared.component, endpoint = %channel.endpoint(), "opening channel");
        channel.connect(shared.context.transport.as_ref());
    }

    fn forward(&self, state: &mut ManagerState, channel: &Channel, request_id: RequestId, out: &mut Deliveries) {
        let Some(request) = state.requests.get(&request_id) else {
            return;
        };
        match channel.send(request) {
            Ok(()) => {
                state.sent.insert(request_id);
            }
            Err(failure) => {
                if let Some(request) = state.requests.remove(&request_id) {
                    out.fail(self.route(), request, failure);
                }
            }
        }
    }

    fn spawn_pump(&self, generation: u64, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
        let manager = Arc::downgrade(&self.shared);
        self.shared.context.runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(shared) = manager.upgrade() else {
                    break;
                };
                ComponentManager { shared }.on_channel_event(generation, event);
            }
        });
    }

    fn on_channel_event(&self, generation: u64, event: ChannelEvent) {
        let shared = &self.shared;
        let mut out = Deliveries::default();
        let mut report = None;
        {
            let mut state = shared.state.lock();
            if state.generation != generation || state.channel.is_none() {
                debug!(component = %shared.component, ?event, "event from a replaced channel");
                return;
            }
            match event {
                ChannelEvent::Connected => self.flush(&mut state, &mut out),
                ChannelEvent::Disconnected => {
                    report = Some(self.on_disconnected(&mut state, &mut out));
                }
                ChannelEvent::Response(response) => self.on_response(&mut state, response, &mut out),
                ChannelEvent::Failure {
                    request_id,
                    failure,
                } => {
                    report = self
                        .on_failure(&mut state, request_id, failure, &mut out)
                        .map(|failure| (Some(failure), None));
                }
            }
        }

        out.flush(&shared.context.delivery);
        if let Some((failure, resume)) = report {
            self.report(failure, resume);
        }
    }

    fn flush(&self, state: &mut ManagerState, out: &mut Deliveries) {
        let Some(channel) = state.channel.clone() else {
            return;
        };
        let waiting: Vec<RequestId> = state
            .requests
            .keys()
            .filter(|id| !state.sent.contains(*id))
            .copied()
            .collect();
        debug!(component = %self.shared.component, count = waiting.len(), "flushing buffered requests");
        for request_id in waiting {
            self.forward(state, &channel, request_id, out);
        }
    }

    fn on_disconnected(
        &self,
        state: &mut ManagerState,
        out: &mut Deliveries,
    ) -> (Option<RequestFailure>, Option<Resume>) {
        let shared = &self.shared;
        let by_app = state
            .channel
            .as_ref()
            .is_some_and(Channel::is_disconnected_by_app);
        let reconnect = std::mem::take(&mut state.reconnect_requested);

        let resume = if by_app && reconnect && !state.requests.is_empty() {
            state.address.clone().map(|address| Resume {
                address,
                requests: drain(state),
            })
        } else {
            None
        };

        if resume.is_none() && !state.requests.is_empty() {
            info!(
                component = %shared.component,
                count = state.requests.len(),
                by_app,
                "channel closed with requests outstanding"
            );
            let failure = shared.context.messages().failure(codes::NETWORK_ERROR);
            out.fail_all(self.route(), drain(state), failure);
        }
        state.sent.clear();

        (None, resume)
    }

    fn on_response(&self, state: &mut ManagerState, response: Response, out: &mut Deliveries) {
        state.sent.remove(&response.request_id);
        match state.requests.remove(&response.request_id) {
            Some(request) => out.succeed(self.route(), request, response),
            None => warn!(
                component = %self.shared.component,
                request_id = response.request_id,
                "response for unknown request dropped"
            ),
        }
    }

    /// Returns the failure to report upward when it concerns the channel.
    fn on_failure(
        &self,
        state: &mut ManagerState,
        request_id: Option<RequestId>,
        failure: RequestFailure,
        out: &mut Deliveries,
    ) -> Option<RequestFailure> {
        let shared = &self.shared;
        if failure.is_channel_level() {
            let requests = drain(state);
            if shared.directory {
                debug!(component = %shared.component, dropped = requests.len(), "directory channel failed");
            } else {
                let network = shared.context.messages().failure(codes::NETWORK_ERROR);
                out.fail_all(Route::Policy, requests, network);
            }
            return Some(failure);
        }

        match request_id {
            Some(request_id) => {
                state.sent.remove(&request_id);
                match state.requests.remove(&request_id) {
                    Some(request) => out.fail(self.route(), request, failure),
                    None => warn!(
                        component = %shared.component,
                        request_id,
                        code = failure.code,
                        "failure for unknown request dropped"
                    ),
                }
            }
            None => warn!(component = %shared.component, code = failure.code, "unattributed channel failure"),
        }
        None
    }

    /// Tell the router the channel is gone. Without a router the manager
    /// clears itself unless requests are still waiting.
    fn report(&self, failure: Option<RequestFailure>, resume: Option<Resume>) {
        let shared = &self.shared;
        let event = ManagerEvent::Disconnected {
            component: shared.component.clone(),
            manager_id: shared.id,
            failure,
            resume,
        };
        let Err(mpsc::error::SendError(event)) = shared.router.send(event) else {
            return;
        };

        let ManagerEvent::Disconnected { resume, .. } = event;
        let keep_alive = {
            let mut state = shared.state.lock();
            if let Some(resume) = resume {
                for request in resume.requests {
                    state.requests.insert(request.request_id, request);
                }
                state.reconnect_requested = true;
            }
            !state.requests.is_empty()
        };

        if keep_alive {
            warn!(component = %shared.component, "router gone, keeping buffered requests");
        } else {
            warn!(component = %shared.component, "router gone, clearing manager");
            let _ = self.clear();
        }
    }
}

fn drain(state: &mut ManagerState) -> Vec<PendingRequest> {
    state.sent.clear();
    state.requests.drain().map(|(_, request)| request).collect()
}
