//! Router configuration.

use crate::domain::error::ErrorMessages;
use crate::domain::request::RequestId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default directory component name.
pub const DEFAULT_DIRECTORY_COMPONENT: &str = "ds";

/// Default directory lookup rpc.
pub const DEFAULT_DIRECTORY_RPC: &str = "servicedirectory.getComponent";

/// Complete router configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Directory service settings
    pub directory: DirectoryConfig,
    /// Timeout applied to directory lookups
    #[serde(with = "duration_serde")]
    pub lookup_timeout: Duration,
    /// Connect timeout used by network transports
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Lookup ids are allocated below this value
    pub lookup_id_threshold: RequestId,
    /// Number of reserved lookup ids
    pub lookup_id_span: u32,
    /// Value of the `hasSalt` wire field
    pub has_salt: bool,
    /// Ids whose callbacks always run immediately
    pub exceptional_ids: HashSet<RequestId>,
    /// Ids whose callbacks run even without a foreground surface
    pub background_ids: HashSet<RequestId>,
    /// Localized failure messages
    pub messages: ErrorMessages,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            directory: DirectoryConfig::default(),
            lookup_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(20),
            lookup_id_threshold: -5000,
            lookup_id_span: 5000,
            has_salt: false,
            exceptional_ids: HashSet::new(),
            background_ids: HashSet::new(),
            messages: ErrorMessages::default(),
        }
    }
}

impl RouterConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.component.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "directory component name cannot be empty".into(),
            ));
        }

        if self.directory.rpc.trim().is_empty() {
            return Err(ConfigError::Invalid("directory rpc cannot be empty".into()));
        }

        if self.lookup_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "lookup_timeout cannot be 0".into(),
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connect_timeout cannot be 0".into(),
            ));
        }

        if self.lookup_id_threshold >= 0 {
            return Err(ConfigError::InvalidLookupRange(
                "lookup_id_threshold must be negative".into(),
            ));
        }

        if self.lookup_id_span == 0 {
            return Err(ConfigError::InvalidLookupRange(
                "lookup_id_span cannot be 0".into(),
            ));
        }

        let lowest = i64::from(self.lookup_id_threshold) - i64::from(self.lookup_id_span);
        if lowest < i64::from(RequestId::MIN) {
            return Err(ConfigError::InvalidLookupRange(format!(
                "lookup range ends at {lowest}, below the smallest request id"
            )));
        }

        if let Some(id) = self.exceptional_ids.intersection(&self.background_ids).next() {
            return Err(ConfigError::OverlappingIdSets(*id));
        }

        Ok(())
    }

    pub fn with_directory_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directory.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exceptional_ids(mut self, ids: impl IntoIterator<Item = RequestId>) -> Self {
        self.exceptional_ids.extend(ids);
        self
    }

    pub fn with_background_ids(mut self, ids: impl IntoIterator<Item = RequestId>) -> Self {
        self.background_ids.extend(ids);
        self
    }
}

/// Directory service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Reserved component name of the directory service
    pub component: String,
    /// Lookup rpc name
    pub rpc: String,
    /// Port of every directory node
    pub port: u16,
    /// Candidate directory hosts
    pub domains: Vec<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            component: DEFAULT_DIRECTORY_COMPONENT.to_owned(),
            rpc: DEFAULT_DIRECTORY_RPC.to_owned(),
            port: 9000,
            domains: Vec::new(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("cannot read configuration: {0}")]
    Io(String),
    /// Configuration is not valid TOML for this schema
    #[error("cannot parse configuration: {0}")]
    Parse(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Lookup id range is unusable
    #[error("invalid lookup id range: {0}")]
    InvalidLookupRange(String),
    /// An id is both exceptional and background-eligible
    #[error("request id {0} is both exceptional and background-eligible")]
    OverlappingIdSets(RequestId),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Durations written as `"20s"`, `"500ms"`, `"2m"` or plain seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .ok()
                .and_then(|m| m.checked_mul(60))
                .map(Duration::from_secs)
                .ok_or("invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
