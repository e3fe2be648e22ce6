//! # Driving Ports (Inbound API)
//!
//! Callers hand the router a [`ResponseCallback`] with every request and
//! receive exactly one outcome through it (or none, when the delivery policy
//! drops a background delivery).

use crate::domain::{RequestFailure, RequestId, Response};

/// Receives the outcome of a request.
pub trait ResponseCallback: Send + Sync {
    fn on_success(&self, response: &Response, request_id: RequestId);

    fn on_failure(&self, failure: &RequestFailure, request_id: RequestId);
}
