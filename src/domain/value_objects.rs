//! Value Objects - Immutable domain primitives
//!
//! Service names, the prefix routing table and the outcome classification
//! shared by the forwarder and the health prober.

use serde::Serialize;

pub const USER_SERVICE: &str = "user-service";
pub const ITEM_SERVICE: &str = "item-service";
pub const LIST_SERVICE: &str = "list-service";

/// Maps the first path segment after `/api` to a backend service name.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(String, String)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Add a `prefix -> service` route, replacing an existing prefix.
    pub fn with_route(mut self, prefix: &str, service: &str) -> Self {
        self.routes.retain(|(p, _)| p != prefix);
        self.routes.push((prefix.to_string(), service.to_string()));
        self
    }

    /// Service that owns `prefix`, if any.
    pub fn service_for(&self, prefix: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, s)| s.as_str())
    }

    /// Distinct service names reachable through the table.
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.routes.iter().map(|(_, s)| s.clone()).collect();
        services.sort();
        services.dedup();
        services
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
            .with_route("auth", USER_SERVICE)
            .with_route("users", USER_SERVICE)
            .with_route("items", ITEM_SERVICE)
            .with_route("categories", ITEM_SERVICE)
            .with_route("lists", LIST_SERVICE)
    }
}

/// How an upstream call counts for its service's circuit breaker.
///
/// Only server-side trouble is a failure: 5xx answers and calls that never
/// got an answer. A 4xx means the backend worked and the caller sent
/// something bad.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure(String),
}

impl CallOutcome {
    /// Classify an upstream HTTP status code.
    pub fn from_status(status: u16) -> Self {
        if status >= 500 {
            CallOutcome::Failure(format!("upstream returned status {}", status))
        } else {
            CallOutcome::Success
        }
    }

    /// A call that produced no response at all.
    pub fn transport(error: impl std::fmt::Display) -> Self {
        CallOutcome::Failure(error.to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success)
    }
}

/// Outcome marker attached to each branch of an aggregated response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    CircuitOpen,
    Error,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routes() {
        let table = RouteTable::default();
        assert_eq!(table.service_for("auth"), Some(USER_SERVICE));
        assert_eq!(table.service_for("users"), Some(USER_SERVICE));
        assert_eq!(table.service_for("items"), Some(ITEM_SERVICE));
        assert_eq!(table.service_for("categories"), Some(ITEM_SERVICE));
        assert_eq!(table.service_for("lists"), Some(LIST_SERVICE));
        assert_eq!(table.service_for("dashboard"), None);
        assert_eq!(table.service_for("unknown"), None);
    }

    #[test]
    fn test_route_replaces_prefix() {
        let table = RouteTable::new()
            .with_route("items", "a")
            .with_route("items", "b");
        assert_eq!(table.service_for("items"), Some("b"));
        assert_eq!(table.services(), vec!["b".to_string()]);
    }

    #[test]
    fn test_services_deduplicated() {
        let services = RouteTable::default().services();
        assert_eq!(services, vec![ITEM_SERVICE, LIST_SERVICE, USER_SERVICE]);
    }

    #[test]
    fn test_client_errors_count_as_success() {
        for status in [200, 201, 204, 301, 400, 401, 403, 404, 409, 422, 499] {
            assert!(CallOutcome::from_status(status).is_success(), "status {}", status);
        }
    }

    #[test]
    fn test_server_errors_count_as_failure() {
        for status in [500, 502, 503, 504, 599] {
            assert!(!CallOutcome::from_status(status).is_success(), "status {}", status);
        }
    }

    #[test]
    fn test_transport_is_failure() {
        let outcome = CallOutcome::transport("connection refused");
        assert_eq!(outcome, CallOutcome::Failure("connection refused".to_string()));
    }

    #[test]
    fn test_source_status_serialization() {
        assert_eq!(serde_json::to_value(SourceStatus::CircuitOpen).unwrap(), "circuit_open");
        assert_eq!(serde_json::to_value(SourceStatus::Ok).unwrap(), "ok");
    }
}
