//! Callback delivery.
//!
//! Deliveries are collected while a lock is held and flushed after it is
//! released, so no callback ever runs under a router, manager or channel lock.
//!
//! Policy, applied to single and batch deliveries alike:
//! 1. exceptional ids are invoked immediately on the delivering thread;
//! 2. otherwise, with an active foreground surface, the callback hops to it;
//! 3. otherwise only background-eligible ids are invoked; the rest are dropped.

use crate::domain::{PendingRequest, RequestFailure, RequestId, Response};
use crate::ports::ForegroundDispatcher;
use crate::router::stats::RouterStats;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// How an outcome reaches its callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Straight to the callback, bypassing the policy
    Direct,
    /// Through the [`DeliveryPolicy`]
    Policy,
}

enum Delivery {
    Success {
        route: Route,
        request: PendingRequest,
        response: Response,
    },
    Failure {
        route: Route,
        requests: Vec<PendingRequest>,
        failure: RequestFailure,
    },
}

/// Outcomes collected inside a critical section.
#[derive(Default)]
pub(crate) struct Deliveries(Vec<Delivery>);

impl Deliveries {
    pub(crate) fn succeed(&mut self, route: Route, request: PendingRequest, response: Response) {
        self.0.push(Delivery::Success {
            route,
            request,
            response,
        });
    }

    pub(crate) fn fail(&mut self, route: Route, request: PendingRequest, failure: RequestFailure) {
        self.fail_all(route, vec![request], failure);
    }

    pub(crate) fn fail_all(
        &mut self,
        route: Route,
        requests: Vec<PendingRequest>,
        failure: RequestFailure,
    ) {
        if !requests.is_empty() {
            self.0.push(Delivery::Failure {
                route,
                requests,
                failure,
            });
        }
    }

    /// Deliver everything, in collection order. Call with no lock held.
    pub(crate) fn flush(self, policy: &DeliveryPolicy) {
        for delivery in self.0 {
            match delivery {
                Delivery::Success {
                    route: Route::Direct,
                    request,
                    response,
                } => request.callback.on_success(&response, request.request_id),
                Delivery::Success {
                    route: Route::Policy,
                    request,
                    response,
                } => policy.deliver_success(request, response),
                Delivery::Failure {
                    route: Route::Direct,
                    requests,
                    failure,
                } => {
                    RouterStats::add(&policy.stats.failures, requests.len());
                    for request in requests {
                        request.callback.on_failure(&failure, request.request_id);
                    }
                }
                Delivery::Failure {
                    route: Route::Policy,
                    requests,
                    failure,
                } => policy.deliver_failures(requests, failure),
            }
        }
    }
}

/// Decides where and whether a callback runs.
pub(crate) struct DeliveryPolicy {
    exceptional: HashSet<RequestId>,
    background: HashSet<RequestId>,
    foreground: Arc<dyn ForegroundDispatcher>,
    stats: Arc<RouterStats>,
}

impl DeliveryPolicy {
    pub(crate) fn new(
        exceptional: HashSet<RequestId>,
        background: HashSet<RequestId>,
        foreground: Arc<dyn ForegroundDispatcher>,
        stats: Arc<RouterStats>,
    ) -> Self {
        Self {
            exceptional,
            background,
            foreground,
            stats,
        }
    }

    pub(crate) fn is_exceptional(&self, request_id: RequestId) -> bool {
        self.exceptional.contains(&request_id)
    }

    pub(crate) fn is_background(&self, request_id: RequestId) -> bool {
        self.background.contains(&request_id)
    }

    pub(crate) fn deliver_success(&self, request: PendingRequest, response: Response) {
        let request_id = request.request_id;
        if self.is_exceptional(request_id) {
            request.callback.on_success(&response, request_id);
            return;
        }

        if self.foreground.has_foreground() {
            let callback = request.callback;
            self.foreground
                .run_on_foreground(Box::new(move || callback.on_success(&response, request_id)));
            return;
        }

        if self.is_background(request_id) {
            request.callback.on_success(&response, request_id);
        } else {
            RouterStats::bump(&self.stats.deliveries_dropped);
            debug!(request_id, component = %request.component, "no foreground, success dropped");
        }
    }

    pub(crate) fn deliver_failures(&self, requests: Vec<PendingRequest>, failure: RequestFailure) {
        RouterStats::add(&self.stats.failures, requests.len());

        let (exceptional, ordinary): (Vec<_>, Vec<_>) = requests
            .into_iter()
            .partition(|request| self.is_exceptional(request.request_id));

        for request in exceptional {
            request.callback.on_failure(&failure, request.request_id);
        }
        if ordinary.is_empty() {
            return;
        }

        if self.foreground.has_foreground() {
            self.foreground.run_on_foreground(Box::new(move || {
                for request in ordinary {
                    request.callback.on_failure(&failure, request.request_id);
                }
            }));
            return;
        }

        for request in ordinary {
            if self.is_background(request.request_id) {
                request.callback.on_failure(&failure, request.request_id);
            } else {
                RouterStats::bump(&self.stats.deliveries_dropped);
                debug!(
                    request_id = request.request_id,
                    code = failure.code,
                    "no foreground, failure dropped"
                );
            }
        }
    }
}
