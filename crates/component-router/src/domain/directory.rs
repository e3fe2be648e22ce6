//! Directory resolution protocol: lookup ids, lookup payloads and replies.

use crate::domain::address::ComponentAddress;
use crate::domain::error::codes;
use crate::domain::request::{RequestId, RequestParams};
use serde_json::Value;
use std::collections::HashMap;

/// Parameter naming the component to resolve.
pub const COMPONENT_NAME_PARAM: &str = "componentName";

/// Parameter marking a development component lookup.
pub const COMPONENT_STATUS_PARAM: &str = "componentStatus";

/// Value of [`COMPONENT_STATUS_PARAM`] for development components.
pub const DEV_STATUS: &str = "dev";

/// Build the payload of a lookup for `component`.
///
/// Privileged lookups carry every string-valued parameter of the caller.
pub fn lookup_params(
    component: &str,
    caller: Option<&RequestParams>,
    privileged: bool,
    development: bool,
) -> RequestParams {
    let mut params = RequestParams::new();
    if privileged {
        if let Some(caller) = caller {
            for (key, value) in caller.string_entries() {
                params.insert(key, value);
            }
        }
    }
    params.insert(COMPONENT_NAME_PARAM, component);
    if development {
        params.insert(COMPONENT_STATUS_PARAM, DEV_STATUS);
    }
    params
}

/// Decoded reply of the directory service.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryReply {
    Address(ComponentAddress),
    Rejected { status: i32, message: Option<String> },
}

/// Reply bodies that could not be interpreted.
#[derive(Debug, thiserror::Error)]
pub enum ReplyError {
    #[error("reply has no numeric status")]
    MissingStatus,

    #[error("address record is malformed: {0}")]
    MalformedAddress(#[source] serde_json::Error),
}

impl ReplyError {
    /// Error code reported to the waiting requests.
    pub fn code(&self) -> i32 {
        match self {
            Self::MissingStatus => codes::RESPONSE_ERROR,
            Self::MalformedAddress(_) => codes::PARSER_ERROR,
        }
    }
}

impl DirectoryReply {
    /// Interpret a decrypted reply body: `status == 200` means an address
    /// record, anything else a `{status, msg}` error record.
    pub fn parse(body: &Value) -> Result<Self, ReplyError> {
        let status = body
            .get("status")
            .and_then(Value::as_i64)
            .and_then(|status| i32::try_from(status).ok())
            .ok_or(ReplyError::MissingStatus)?;

        if status == codes::SUCCESS_STATUS {
            let address = serde_json::from_value(body.clone()).map_err(ReplyError::MalformedAddress)?;
            return Ok(Self::Address(address));
        }

        let message = body
            .get("msg")
            .and_then(Value::as_str)
            .filter(|msg| !msg.is_empty())
            .map(str::to_owned);
        Ok(Self::Rejected { status, message })
    }
}

/// Outstanding lookups keyed by their synthetic id.
///
/// Ids are allocated sequentially from `threshold - 1` downwards through a
/// span of `span` ids, wrapping around and skipping ids still in use. At most
/// one lookup per component is outstanding.
#[derive(Debug)]
pub struct LookupTable {
    by_id: HashMap<RequestId, String>,
    highest: i64,
    lowest: i64,
    next: i64,
}

impl LookupTable {
    pub fn new(threshold: RequestId, span: u32) -> Self {
        let highest = i64::from(threshold) - 1;
        let lowest = i64::from(threshold) - i64::from(span.max(1));
        Self {
            by_id: HashMap::new(),
            highest,
            lowest,
            next: highest,
        }
    }

    /// True when `id` falls inside the reserved lookup range.
    pub fn is_reserved(&self, id: RequestId) -> bool {
        (self.lowest..=self.highest).contains(&i64::from(id))
    }

    pub fn is_outstanding(&self, component: &str) -> bool {
        self.by_id.values().any(|name| name == component)
    }

    /// Record a lookup for `component` and return its id, or `None` when every
    /// id of the range is in use.
    pub fn begin(&mut self, component: &str) -> Option<RequestId> {
        let span = self.highest - self.lowest + 1;
        for _ in 0..span {
            let candidate = self.next;
            self.next = if candidate <= self.lowest {
                self.highest
            } else {
                candidate - 1
            };
            let Ok(id) = RequestId::try_from(candidate) else {
                continue;
            };
            if !self.by_id.contains_key(&id) {
                self.by_id.insert(id, component.to_owned());
                return Some(id);
            }
        }
        None
    }

    /// Finish a lookup, returning the component it resolved.
    pub fn complete(&mut self, id: RequestId) -> Option<String> {
        self.by_id.remove(&id)
    }

    /// Discard every outstanding lookup.
    pub fn clear(&mut self) -> usize {
        let discarded = self.by_id.len();
        self.by_id.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
