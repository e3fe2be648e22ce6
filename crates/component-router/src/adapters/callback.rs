use crate::domain::{RequestFailure, RequestId, Response};
use crate::ports::ResponseCallback;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Outcome of one request.
pub type RequestOutcome = Result<Response, RequestFailure>;

/// Bridges the callback interface to an awaitable oneshot receiver.
pub struct OneshotCallback {
    sender: Mutex<Option<oneshot::Sender<RequestOutcome>>>,
}

impl OneshotCallback {
    pub fn channel() -> (Arc<dyn ResponseCallback>, oneshot::Receiver<RequestOutcome>) {
        let (sender, receiver) = oneshot::channel();
        let callback = Self {
            sender: Mutex::new(Some(sender)),
        };
        (Arc::new(callback), receiver)
    }

    fn complete(&self, outcome: RequestOutcome) {
        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(outcome);
        }
    }
}

impl ResponseCallback for OneshotCallback {
    fn on_success(&self, response: &Response, _request_id: RequestId) {
        self.complete(Ok(response.clone()));
    }

    fn on_failure(&self, failure: &RequestFailure, _request_id: RequestId) {
        self.complete(Err(failure.clone()));
    }
}
