//! Error codes and failure values delivered to request callbacks.
//!
//! Every failure a caller observes is a [`RequestFailure`]: a numeric code from
//! [`codes`] (or a status reported by the directory service) plus a message.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Numeric error codes shared with the remote components.
pub mod codes {
    // Connectivity (-5001 to -5004)
    pub const NETWORK_DOWN: i32 = -5001;
    pub const NETWORK_ERROR: i32 = -5002;
    pub const CONNECTION_ERROR: i32 = -5003;
    pub const CONNECTION_TIMEOUT: i32 = -5004;

    // Request/response handling (-5005 to -5010)
    pub const REQUEST_ERROR: i32 = -5005;
    pub const SERVER_ERROR: i32 = -5006;
    pub const PARSER_ERROR: i32 = -5007;
    pub const RESPONSE_ERROR: i32 = -5008;
    pub const REQUEST_TIMEOUT: i32 = -5009;
    pub const CLEANUP_ERROR: i32 = -5010;

    /// Status value of a successful directory reply.
    pub const SUCCESS_STATUS: i32 = 200;

    /// English fallback text for a code.
    pub fn default_message(code: i32) -> &'static str {
        match code {
            NETWORK_DOWN => "No network connection",
            NETWORK_ERROR => "Network error",
            CONNECTION_ERROR => "Unable to connect to server",
            CONNECTION_TIMEOUT => "Connection timed out",
            REQUEST_ERROR => "Unable to build request",
            SERVER_ERROR => "Server error",
            PARSER_ERROR => "Unable to parse server response",
            RESPONSE_ERROR => "Invalid server response",
            REQUEST_TIMEOUT => "Request timed out",
            CLEANUP_ERROR => "Request cancelled during cleanup",
            _ => "Unknown error",
        }
    }
}

/// Failure delivered to a [`ResponseCallback`](crate::ports::ResponseCallback).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFailure {
    /// Error code (see [`codes`]) or directory-reported status
    pub code: i32,
    /// Human readable message
    pub message: String,
}

impl RequestFailure {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Failure with the English default text for `code`.
    pub fn from_code(code: i32) -> Self {
        Self::new(code, codes::default_message(code))
    }

    /// Connection-scoped failures raised by a channel rather than a request.
    pub fn is_channel_level(&self) -> bool {
        matches!(
            self.code,
            codes::CONNECTION_ERROR | codes::CONNECTION_TIMEOUT
        )
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for RequestFailure {}

/// Localized messages keyed by error code.
///
/// Serialized as a table with string keys (`"-5001" = "..."`) so it can live
/// in TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorMessages(HashMap<i32, String>);

impl ErrorMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: i32, message: impl Into<String>) {
        self.0.insert(code, message.into());
    }

    /// Localized text for `code`, falling back to the English default.
    pub fn text(&self, code: i32) -> String {
        self.0
            .get(&code)
            .cloned()
            .unwrap_or_else(|| codes::default_message(code).to_owned())
    }

    /// Build the failure for `code` with its localized text.
    pub fn failure(&self, code: i32) -> RequestFailure {
        RequestFailure::new(code, self.text(code))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ErrorMessages {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let table: BTreeMap<String, &String> =
            self.0.iter().map(|(code, text)| (code.to_string(), text)).collect();
        table.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ErrorMessages {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let table = HashMap::<String, String>::deserialize(deserializer)?;
        let mut messages = HashMap::with_capacity(table.len());
        for (key, text) in table {
            let code = key.trim().parse::<i32>().map_err(|_| {
                serde::de::Error::custom(format!("message key '{key}' is not an error code"))
            })?;
            messages.insert(code, text);
        }
        Ok(Self(messages))
    }
}

/// Errors raised while constructing a [`Router`](crate::Router).
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("invalid configuration: {0}")]
    Config(#[from] crate::domain::config::ConfigError),

    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}
