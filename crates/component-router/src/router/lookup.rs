//! Completion of directory lookups.

use super::delivery::{Deliveries, Route};
use super::RouterInner;
use crate::domain::directory::DirectoryReply;
use crate::domain::{codes, RequestFailure, RequestId, Response};
use crate::ports::ResponseCallback;
use serde_json::Value;
use std::sync::Weak;
use tracing::{debug, info, warn};

/// Callback attached to every lookup request sent to the directory.
pub(crate) struct LookupCallback {
    router: Weak<RouterInner>,
}

impl LookupCallback {
    pub(crate) fn new(router: Weak<RouterInner>) -> Self {
        Self { router }
    }
}

impl ResponseCallback for LookupCallback {
    fn on_success(&self, response: &Response, request_id: RequestId) {
        match self.router.upgrade() {
            Some(router) => router.complete_lookup(request_id, &response.body),
            None => debug!(lookup_id = request_id, "router gone, lookup reply dropped"),
        }
    }

    fn on_failure(&self, failure: &RequestFailure, request_id: RequestId) {
        match self.router.upgrade() {
            Some(router) => router.fail_lookup(request_id, failure.clone()),
            None => debug!(lookup_id = request_id, "router gone, lookup failure dropped"),
        }
    }
}

impl RouterInner {
    fn complete_lookup(&self, lookup_id: RequestId, body: &Value) {
        let address = match DirectoryReply::parse(body) {
            Ok(DirectoryReply::Address(address)) => address,
            Ok(DirectoryReply::Rejected { status, message }) => {
                let message = message.unwrap_or_else(|| self.messages().text(status));
                self.fail_lookup(lookup_id, RequestFailure::new(status, message));
                return;
            }
            Err(error) => {
                warn!(lookup_id, error = %error, "cannot interpret directory reply");
                self.fail_lookup(lookup_id, self.messages().failure(error.code()));
                return;
            }
        };

        let mut out = Deliveries::default();
        {
            let mut state = self.state.lock();
            let Some(component) = state.lookups.complete(lookup_id) else {
                debug!(lookup_id, "reply for a lookup no longer outstanding");
                return;
            };
            let requests = state.take_pending_for(&component);

            if address.is_direct_endpoint() {
                info!(component = %component, count = requests.len(), "component resolved to a direct endpoint");
                for request in requests {
                    let response = Response::new(request.request_id, body.clone());
                    out.succeed(Route::Policy, request, response);
                }
            } else if address.has_service_port() {
                info!(
                    component = %component,
                    host = address.host().unwrap_or_default(),
                    port = address.nport,
                    count = requests.len(),
                    "component resolved"
                );
                // Privileged requests gave up their payload to the lookup.
                let (sendable, stripped): (Vec<_>, Vec<_>) =
                    requests.into_iter().partition(|request| request.params.is_some());
                if !stripped.is_empty() {
                    warn!(component = %component, count = stripped.len(), "privileged requests resolved to a service port");
                    out.fail_all(Route::Policy, stripped, self.messages().failure(codes::REQUEST_ERROR));
                }

                let manager = self.new_manager(&component, Some(address));
                if let Some(previous) = state.managers.insert(component, manager.clone()) {
                    previous.teardown(&mut out);
                }
                for request in sendable {
                    manager.send(request, &mut out);
                }
            } else {
                warn!(component = %component, "directory record has no usable port");
                let failure = self.messages().failure(codes::RESPONSE_ERROR);
                out.fail_all(Route::Policy, requests, failure);
            }
        }
        out.flush(&self.context.delivery);
    }
}
