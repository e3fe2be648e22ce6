//! Requests, their parameters and responses.

use crate::ports::ResponseCallback;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Caller-chosen request identifier. Negative ids at or below the configured
/// lookup threshold are reserved for directory lookups.
pub type RequestId = i32;

/// Parameter flag marking a privileged request (resolved to an endpoint, not
/// forwarded to the component).
pub const SIP_FLAG: &str = "sip";

/// Parameter flag marking a development component.
pub const DEV_COMPONENT_FLAG: &str = "isDevComponent";

/// JSON object of request parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestParams(Map<String, Value>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// True when `key` holds the boolean `true`.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(Value::Bool(true)))
    }

    /// Remove `key` and report whether it held `true`.
    pub fn take_flag(&mut self, key: &str) -> bool {
        matches!(self.0.remove(key), Some(Value::Bool(true)))
    }

    /// String-valued entries only.
    pub fn string_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|text| (key.as_str(), text)))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RequestParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Decrypted response body delivered on success.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub request_id: RequestId,
    pub body: Value,
}

impl Response {
    pub fn new(request_id: RequestId, body: Value) -> Self {
        Self { request_id, body }
    }
}

/// A request accepted by the router and awaiting its single outcome.
///
/// Owned by exactly one holder at a time: the router while its component is
/// being resolved, then the component's connection manager.
#[derive(Clone)]
pub struct PendingRequest {
    pub component: String,
    pub rpc: String,
    pub request_id: RequestId,
    pub timeout: Duration,
    /// `None` for privileged requests, which never reach a component.
    pub params: Option<RequestParams>,
    pub callback: Arc<dyn ResponseCallback>,
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("component", &self.component)
            .field("rpc", &self.rpc)
            .field("request_id", &self.request_id)
            .field("timeout", &self.timeout)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
