//! Domain Entities - Core gateway objects
//!
//! These entities describe the backend instances the gateway knows about
//! and the persisted shape of the service registry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A live backend instance announced through registration/heartbeat.
///
/// Several instances may share a `name`; the `(name, host, port)` triple
/// is the identity of a registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    /// Logical service name (e.g. `item-service`)
    pub name: String,
    /// Host the instance listens on
    pub host: String,
    /// Port the instance listens on
    pub port: u16,
    /// Opaque metadata supplied by the instance
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
    /// Last registration/heartbeat, milliseconds since the Unix epoch
    #[serde(rename = "lastHeartbeat")]
    pub last_heartbeat_ms: u64,
}

impl ServiceRegistration {
    /// True when this registration is the instance identified by `host:port`.
    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }

    pub fn address(&self) -> ServiceAddress {
        ServiceAddress::new(self.host.clone(), self.port)
    }
}

/// Reachable network address of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceAddress {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl ServiceAddress {
    /// Plain-HTTP address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "http".to_string(),
            host: host.into(),
            port,
        }
    }

    /// Parse a base URL such as `http://localhost:3001`.
    ///
    /// Returns `None` for URLs without a host. A missing port falls back to
    /// the scheme's well-known port.
    pub fn parse(url: &str) -> Option<Self> {
        let parsed = reqwest::Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_string();
        let port = parsed.port_or_known_default()?;
        Some(Self {
            scheme: parsed.scheme().to_string(),
            host,
            port,
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Join a path (which must start with `/`) onto the base URL.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url(), path_and_query)
    }
}

impl std::fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.base_url())
    }
}

/// Persisted registry contents: service name to its instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub services: BTreeMap<String, Vec<ServiceRegistration>>,
}

impl RegistrySnapshot {
    /// Total number of instances across all services.
    pub fn instance_count(&self) -> usize {
        self.services.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(host: &str, port: u16) -> ServiceRegistration {
        ServiceRegistration {
            name: "item-service".to_string(),
            host: host.to_string(),
            port,
            meta: HashMap::new(),
            last_heartbeat_ms: 1_000,
        }
    }

    #[test]
    fn test_registration_matches() {
        let reg = registration("10.0.0.1", 3002);
        assert!(reg.matches("10.0.0.1", 3002));
        assert!(!reg.matches("10.0.0.1", 3003));
        assert!(!reg.matches("10.0.0.2", 3002));
    }

    #[test]
    fn test_registration_serializes_last_heartbeat() {
        let reg = registration("localhost", 3002);
        let json = serde_json::to_value(&reg).unwrap();
        assert_eq!(json["lastHeartbeat"], 1_000);
        assert_eq!(json["name"], "item-service");
        assert!(json["meta"].is_object());
    }

    #[test]
    fn test_registration_meta_defaults_to_empty() {
        let json = r#"{"name":"a","host":"h","port":1,"lastHeartbeat":5}"#;
        let reg: ServiceRegistration = serde_json::from_str(json).unwrap();
        assert!(reg.meta.is_empty());
        assert_eq!(reg.last_heartbeat_ms, 5);
    }

    #[test]
    fn test_address_parse() {
        let addr = ServiceAddress::parse("http://localhost:3001").unwrap();
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, 3001);
        assert_eq!(addr.base_url(), "http://localhost:3001");
    }

    #[test]
    fn test_address_parse_default_port() {
        let addr = ServiceAddress::parse("https://items.internal").unwrap();
        assert_eq!(addr.port, 443);
        assert_eq!(addr.scheme, "https");
    }

    #[test]
    fn test_address_parse_invalid() {
        assert!(ServiceAddress::parse("not a url").is_none());
    }

    #[test]
    fn test_address_url_for() {
        let addr = ServiceAddress::new("10.0.0.1", 3003);
        assert_eq!(addr.url_for("/lists?x=1"), "http://10.0.0.1:3003/lists?x=1");
        assert_eq!(addr.to_string(), "http://10.0.0.1:3003");
    }

    #[test]
    fn test_snapshot_roundtrip_shape() {
        let mut snapshot = RegistrySnapshot::default();
        snapshot
            .services
            .insert("item-service".to_string(), vec![registration("h", 1)]);
        assert_eq!(snapshot.instance_count(), 1);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.starts_with("{\"services\":{\"item-service\":["));

        let back: RegistrySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_snapshot_missing_services_key() {
        let snapshot: RegistrySnapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(snapshot.instance_count(), 0);
    }
}
