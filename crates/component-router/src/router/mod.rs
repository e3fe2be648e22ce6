//! # Request Router
//!
//! Process-wide entry point. Routes each request to its component's manager,
//! resolving unknown components through the directory service first, and
//! reacts to managers reporting disconnection.
//!
//! ## Flow
//!
//! ```text
//! send_request ──▶ manager known & usable? ──yes──▶ ComponentManager::send
//!                        │ no
//!                        ▼
//!                 queue PendingRequest ──▶ lookup outstanding? ──yes──▶ wait
//!                                                  │ no
//!                                                  ▼
//!                                  directory manager ◀── lookup (id ≤ threshold)
//!                                                  │
//!                     lookup reply ──▶ create manager, flush queued requests
//! ```

pub(crate) mod delivery;
mod lookup;
pub mod stats;


use crate::channel::{ChannelOptions, ChannelStatus};
use crate::domain::directory::{lookup_params, LookupTable};
use crate::domain::request::{DEV_COMPONENT_FLAG, SIP_FLAG};
use crate::domain::{
    codes, ComponentAddress, PendingRequest, RequestFailure, RequestId, RequestParams,
    RouterConfig, RouterError,
};
use crate::manager::{ComponentManager, ManagerContext, ManagerEvent, Resume};
use crate::ports::{Collaborators, Connectivity, DomainSelector, ResponseCallback};
use delivery::{Deliveries, DeliveryPolicy, Route};
use lookup::LookupCallback;
use parking_lot::Mutex;
use stats::{RouterStats, StatsSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Cloneable handle to the router.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

pub(crate) struct RouterInner {
    config: RouterConfig,
    connectivity: Arc<dyn Connectivity>,
    domains: Arc<dyn DomainSelector>,
    context: Arc<ManagerContext>,
    stats: Arc<RouterStats>,
    events: mpsc::UnboundedSender<ManagerEvent>,
    next_manager_id: AtomicU64,
    this: Weak<RouterInner>,
    state: Mutex<RouterState>,
}

struct RouterState {
    managers: HashMap<String, ComponentManager>,
    /// Requests waiting for their component to be resolved
    pending: HashMap<RequestId, PendingRequest>,
    lookups: LookupTable,
}

impl Router {
    /// Build a router on the current tokio runtime.
    pub fn new(config: RouterConfig, collaborators: Collaborators) -> Result<Self, RouterError> {
        let runtime = Handle::try_current().map_err(|e| RouterError::NoRuntime(e.to_string()))?;
        Self::with_runtime(config, collaborators, runtime)
    }

    /// Build a router whose tasks run on `runtime`. Requests may then be sent
    /// from any thread.
    pub fn with_runtime(
        config: RouterConfig,
        collaborators: Collaborators,
        runtime: Handle,
    ) -> Result<Self, RouterError> {
        config.validate()?;

        let stats = Arc::new(RouterStats::default());
        let context = Arc::new(ManagerContext {
            runtime: runtime.clone(),
            transport: collaborators.transport,
            channel_options: ChannelOptions {
                has_salt: config.has_salt,
                cipher: collaborators.cipher,
                messages: Arc::new(config.messages.clone()),
            },
            delivery: DeliveryPolicy::new(
                config.exceptional_ids.clone(),
                config.background_ids.clone(),
                collaborators.foreground,
                stats.clone(),
            ),
        });

        let (events, receiver) = mpsc::unbounded_channel();
        let lookups = LookupTable::new(config.lookup_id_threshold, config.lookup_id_span);
        let inner = Arc::new_cyclic(|this| RouterInner {
            config,
            connectivity: collaborators.connectivity,
            domains: collaborators.domains,
            context,
            stats,
            events,
            next_manager_id: AtomicU64::new(1),
            this: this.clone(),
            state: Mutex::new(RouterState {
                managers: HashMap::new(),
                pending: HashMap::new(),
                lookups,
            }),
        });

        runtime.spawn(pump(Arc::downgrade(&inner), receiver));
        info!(directory = %inner.config.directory.component, "router started");
        Ok(Self { inner })
    }

    /// Submit a request. Exactly one of `on_success`/`on_failure` follows,
    /// unless the delivery policy drops it. A request whose id is already
    /// pending is ignored.
    pub fn send_request(
        &self,
        params: RequestParams,
        request_id: RequestId,
        timeout: Duration,
        rpc: &str,
        component: &str,
        callback: Arc<dyn ResponseCallback>,
    ) {
        let inner = &self.inner;
        RouterStats::bump(&inner.stats.submitted);

        if !inner.connectivity.is_network_available() || inner.connectivity.is_airplane_mode_on() {
            warn!(component, request_id, "network down");
            RouterStats::bump(&inner.stats.failures);
            callback.on_failure(&inner.messages().failure(codes::NETWORK_DOWN), request_id);
            return;
        }

        let request = PendingRequest {
            component: component.to_owned(),
            rpc: rpc.to_owned(),
            request_id,
            timeout,
            params: Some(params),
            callback,
        };

        let mut out = Deliveries::default();
        {
            let mut state = inner.state.lock();
            if state.lookups.is_reserved(request_id) {
                warn!(component, request_id, "request id inside the lookup range");
                out.fail(
                    Route::Direct,
                    request,
                    inner.messages().failure(codes::REQUEST_ERROR),
                );
            } else if state.holds(request_id) {
                warn!(component, request_id, "duplicate request id rejected");
                RouterStats::bump(&inner.stats.duplicates_rejected);
            } else {
                inner.route(&mut state, request, &mut out);
            }
        }
        out.flush(&inner.context.delivery);
    }

    /// Wind down one component: keep it if it has background work, otherwise
    /// disconnect it. Dead or channel-less managers are removed.
    pub fn destroy_component(&self, component: &str) {
        let inner = &self.inner;
        let mut out = Deliveries::default();
        {
            let mut state = inner.state.lock();
            inner.sweep(&mut state, component, &mut out);
        }
        out.flush(&inner.context.delivery);
    }

    /// [`destroy_component`](Self::destroy_component) for every component.
    pub fn destroy_all(&self) {
        let inner = &self.inner;
        let mut out = Deliveries::default();
        {
            let mut state = inner.state.lock();
            let components: Vec<String> = state.managers.keys().cloned().collect();
            for component in components {
                inner.sweep(&mut state, &component, &mut out);
            }
        }
        out.flush(&inner.context.delivery);
    }

    /// Requests waiting for a directory lookup.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn outstanding_lookups(&self) -> usize {
        self.inner.state.lock().lookups.len()
    }

    pub fn has_component(&self, component: &str) -> bool {
        self.inner.state.lock().managers.contains_key(component)
    }

    /// Channel status of a component's manager, if it has one.
    pub fn component_status(&self, component: &str) -> Option<ChannelStatus> {
        let manager = self.inner.state.lock().managers.get(component).cloned()?;
        manager.channel_status()
    }

    /// Requests held by component managers.
    pub fn in_flight_count(&self) -> usize {
        let managers: Vec<ComponentManager> =
            self.inner.state.lock().managers.values().cloned().collect();
        managers.iter().map(ComponentManager::buffered).sum()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn config(&self) -> &RouterConfig {
        &self.inner.config
    }
}

impl RouterState {
    /// True when `request_id` is queued here or held by any manager.
    fn holds(&self, request_id: RequestId) -> bool {
        self.pending.contains_key(&request_id)
            || self.managers.values().any(|manager| manager.contains(request_id))
    }

    fn take_pending_for(&mut self, component: &str) -> Vec<PendingRequest> {
        let ids: Vec<RequestId> = self
            .pending
            .iter()
            .filter(|(_, request)| request.component == component)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .collect()
    }
}

impl RouterInner {
    fn messages(&self) -> &crate::domain::ErrorMessages {
        self.context.messages()
    }

    fn directory_name(&self) -> &str {
        &self.config.directory.component
    }

    fn new_manager(&self, component: &str, address: Option<ComponentAddress>) -> ComponentManager {
        let id = self.next_manager_id.fetch_add(1, Ordering::Relaxed);
        let directory = component == self.directory_name();
        debug!(component, manager_id = id, directory, "creating manager");
        ComponentManager::new(
            id,
            component,
            address,
            directory,
            self.context.clone(),
            self.events.clone(),
        )
    }

    fn route(&self, state: &mut RouterState, mut request: PendingRequest, out: &mut Deliveries) {
        let component = request.component.clone();

        if let Some(manager) = state.managers.get(&component).cloned() {
            let usable = if manager.is_directory() {
                manager.has_channel()
            } else {
                manager.is_usable()
            };
            if usable {
                RouterStats::bump(&self.stats.dispatched);
                manager.send(request, out);
                return;
            }
            info!(component = %component, "manager channel died, replacing");
            state.managers.remove(&component);
            manager.teardown(out);
        }

        let development = request
            .params
            .as_mut()
            .is_some_and(|params| params.take_flag(DEV_COMPONENT_FLAG));
        let privileged = request
            .params
            .as_ref()
            .is_some_and(|params| params.flag(SIP_FLAG));
        let lookup = lookup_params(&component, request.params.as_ref(), privileged, development);
        if privileged {
            request.params = None;
        }

        let request_id = request.request_id;
        state.pending.insert(request_id, request);
        if state.lookups.is_outstanding(&component) {
            debug!(component = %component, request_id, "riding outstanding lookup");
            return;
        }

        let Some(lookup_id) = state.lookups.begin(&component) else {
            error!(component = %component, "lookup id range exhausted");
            let failure = self.messages().failure(codes::REQUEST_ERROR);
            out.fail_all(Route::Policy, state.take_pending_for(&component), failure);
            return;
        };

        let Some(directory) = self.directory_manager(state, out) else {
            state.lookups.complete(lookup_id);
            let failure = self.messages().failure(codes::NETWORK_ERROR);
            out.fail_all(Route::Policy, state.take_pending_for(&component), failure);
            return;
        };

        info!(component = %component, lookup_id, "resolving component");
        RouterStats::bump(&self.stats.lookups_issued);
        let lookup = PendingRequest {
            component: self.directory_name().to_owned(),
            rpc: self.config.directory.rpc.clone(),
            request_id: lookup_id,
            timeout: self.config.lookup_timeout,
            params: Some(lookup),
            callback: Arc::new(LookupCallback::new(self.this.clone())),
        };
        directory.send(lookup, out);
    }

    /// The directory manager, created on first use or after its channel went
    /// away entirely.
    fn directory_manager(&self, state: &mut RouterState, out: &mut Deliveries) -> Option<ComponentManager> {
        let name = self.directory_name().to_owned();
        if let Some(manager) = state.managers.get(&name).cloned() {
            if manager.has_channel() {
                return Some(manager);
            }
            state.managers.remove(&name);
            manager.teardown(out);
        }

        let Some(domain) = self.domains.select_domain() else {
            error!("no directory domain available");
            return None;
        };
        let address = ComponentAddress::directory(domain, self.domains.port());
        let manager = self.new_manager(&name, Some(address));
        state.managers.insert(name, manager.clone());
        Some(manager)
    }

    fn sweep(&self, state: &mut RouterState, component: &str, out: &mut Deliveries) {
        let Some(manager) = state.managers.get(component).cloned() else {
            debug!(component, "nothing to destroy");
            return;
        };

        match manager.channel_status() {
            None | Some(ChannelStatus::Disconnected | ChannelStatus::Failed) => {
                debug!(component, "removing idle manager");
                state.managers.remove(component);
                manager.teardown(out);
            }
            Some(_) if manager.any_background_task() => {
                debug!(component, "keeping manager with background work");
            }
            Some(_) => {
                info!(component, "disconnecting component");
                manager.disconnect();
            }
        }
    }

    fn on_manager_event(&self, event: ManagerEvent) {
        let ManagerEvent::Disconnected {
            component,
            manager_id,
            failure,
            resume,
        } = event;

        let mut out = Deliveries::default();
        {
            let mut state = self.state.lock();
            match state.managers.get(&component) {
                Some(current) if current.id() == manager_id => {
                    if let Some(manager) = state.managers.remove(&component) {
                        manager.teardown(&mut out);
                    }
                }
                _ => {
                    debug!(component = %component, manager_id, "event from a replaced manager");
                    return;
                }
            }

            match &failure {
                Some(failure) => warn!(component = %component, code = failure.code, "component disconnected with error"),
                None => info!(component = %component, "component disconnected"),
            }

            if component == self.directory_name() && resume.is_none() {
                let requests: Vec<PendingRequest> = state.pending.drain().map(|(_, r)| r).collect();
                let discarded = state.lookups.clear();
                if !requests.is_empty() || discarded > 0 {
                    warn!(
                        failed = requests.len(),
                        discarded,
                        "directory unavailable, failing pending requests"
                    );
                }
                let failure = self.messages().failure(codes::NETWORK_ERROR);
                out.fail_all(Route::Policy, requests, failure);
            } else if component != self.directory_name() {
                let requests = state.take_pending_for(&component);
                let failure = self.messages().failure(codes::NETWORK_ERROR);
                out.fail_all(Route::Policy, requests, failure);
            }

            if let Some(Resume { address, requests }) = resume {
                info!(component = %component, count = requests.len(), "reconnecting with waiting requests");
                let manager = self.new_manager(&component, Some(address));
                state.managers.insert(component.clone(), manager.clone());
                for request in requests {
                    manager.send(request, &mut out);
                }
            }
        }
        out.flush(&self.context.delivery);
    }

    /// Fail the requests of a lookup's component.
    fn fail_lookup(&self, lookup_id: RequestId, failure: RequestFailure) {
        let mut out = Deliveries::default();
        {
            let mut state = self.state.lock();
            let Some(component) = state.lookups.complete(lookup_id) else {
                debug!(lookup_id, "failure for a lookup no longer outstanding");
                return;
            };
            warn!(component = %component, lookup_id, code = failure.code, "lookup failed");
            let requests = state.take_pending_for(&component);
            out.fail_all(Route::Policy, requests, failure);
        }
        out.flush(&self.context.delivery);
    }
}

async fn pump(router: Weak<RouterInner>, mut events: mpsc::UnboundedReceiver<ManagerEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = router.upgrade() else {
            break;
        };
        inner.on_manager_event(event);
    }
}
