//! Component address records returned by the directory service.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Where a component can be reached.
///
/// Field names follow the directory service's JSON record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentAddress {
    #[serde(deserialize_with = "lenient_text")]
    pub component_ip: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub public_ip: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub domain: Option<String>,
    /// Sent as a string or a number depending on the directory version
    #[serde(deserialize_with = "lenient_text")]
    pub token_time_stamp: Option<String>,
    #[serde(rename = "isTlsEnabled")]
    pub tls_enabled: bool,
    pub port: i32,
    /// Service port used for the persistent channel
    pub nport: i32,
    /// Direct-endpoint port; a positive value means no channel is opened
    pub sip_port: i32,
    pub tls_port: i32,
}

impl ComponentAddress {
    /// Address of a directory service node.
    pub fn directory(domain: impl Into<String>, port: u16) -> Self {
        Self {
            domain: Some(domain.into()),
            nport: i32::from(port),
            ..Self::default()
        }
    }

    /// Host to dial: domain, then component IP, then public IP.
    pub fn host(&self) -> Option<&str> {
        [&self.domain, &self.component_ip, &self.public_ip]
            .into_iter()
            .filter_map(|candidate| candidate.as_deref())
            .map(str::trim)
            .find(|host| !host.is_empty())
    }

    pub fn has_service_port(&self) -> bool {
        self.nport > 0
    }

    pub fn is_direct_endpoint(&self) -> bool {
        self.sip_port > 0
    }

    /// Channel endpoint, or `None` when no host or port is usable.
    pub fn endpoint(&self) -> Option<Endpoint> {
        let host = self.host()?;
        let secure = self.tls_enabled && self.tls_port > 0;
        let port = if secure { self.tls_port } else { self.nport };
        let port = u16::try_from(port).ok().filter(|port| *port > 0)?;
        Some(Endpoint {
            host: host.to_owned(),
            port,
            secure,
        })
    }
}

/// Text field that also accepts scalar JSON values.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected text, found {other}"
        ))),
    }
}

/// Resolved network endpoint of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            secure: false,
        }
    }

    /// WebSocket URL for this endpoint.
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_directory_record() {
        let address: ComponentAddress = serde_json::from_value(json!({
            "status": 200,
            "componentIp": "10.0.0.5",
            "nport": 9000,
            "sipPort": 0,
            "isTlsEnabled": false
        }))
        .unwrap();

        assert_eq!(address.component_ip.as_deref(), Some("10.0.0.5"));
        assert!(address.has_service_port());
        assert!(!address.is_direct_endpoint());
        assert_eq!(address.endpoint(), Some(Endpoint::new("10.0.0.5", 9000)));
    }

    #[test]
    fn test_numeric_token_time_stamp_accepted() {
        let address: ComponentAddress = serde_json::from_value(json!({
            "status": 200,
            "componentIp": "10.0.0.5",
            "nport": 9000,
            "sipPort": 0,
            "tokenTimeStamp": 1_700_000_000_u64
        }))
        .unwrap();
        assert_eq!(address.token_time_stamp.as_deref(), Some("1700000000"));
        assert!(address.has_service_port());

        let nested = serde_json::from_value::<ComponentAddress>(json!({"componentIp": ["10.0.0.5"]}));
        assert!(nested.is_err());
    }

    #[test]
    fn test_host_preference() {
        let mut address = ComponentAddress {
            component_ip: Some("10.0.0.5".into()),
            public_ip: Some("203.0.113.7".into()),
            domain: Some("  ".into()),
            nport: 9000,
            ..ComponentAddress::default()
        };
        assert_eq!(address.host(), Some("10.0.0.5"));

        address.domain = Some("billing.example.com".into());
        assert_eq!(address.host(), Some("billing.example.com"));

        address.domain = None;
        address.component_ip = None;
        assert_eq!(address.host(), Some("203.0.113.7"));
    }

    #[test]
    fn test_tls_port_used_when_enabled() {
        let address = ComponentAddress {
            domain: Some("billing.example.com".into()),
            tls_enabled: true,
            nport: 9000,
            tls_port: 9443,
            ..ComponentAddress::default()
        };
        let endpoint = address.endpoint().unwrap();
        assert_eq!(endpoint.port, 9443);
        assert_eq!(endpoint.url(), "wss://billing.example.com:9443");
    }

    #[test]
    fn test_no_endpoint_without_host_or_port() {
        let no_host = ComponentAddress {
            nport: 9000,
            ..ComponentAddress::default()
        };
        assert!(no_host.endpoint().is_none());

        let bad_port = ComponentAddress {
            component_ip: Some("10.0.0.5".into()),
            nport: 70_000,
            ..ComponentAddress::default()
        };
        assert!(bad_port.endpoint().is_none());
    }
}
