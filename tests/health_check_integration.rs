//! Integration tests for the Health Checker with Wiremock
//!
//! Probes run against mock services; outcomes land in the circuit breaker.

use edge_gateway::domain::ServiceAddress;
use edge_gateway::infrastructure::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, HealthCheckConfig, HealthChecker,
    ManualClock, ServiceRegistry,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn checker_for(
    services: &[(&str, &MockServer)],
    config: HealthCheckConfig,
) -> (Arc<HealthChecker>, Arc<CircuitBreaker>, Arc<ManualClock>) {
    let statics: HashMap<String, ServiceAddress> = services
        .iter()
        .map(|(name, server)| (name.to_string(), ServiceAddress::parse(&server.uri()).unwrap()))
        .collect();

    let clock = Arc::new(ManualClock::new(0));
    let registry = Arc::new(ServiceRegistry::new(clock.clone(), statics));
    let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default(), clock.clone()));
    let checker = Arc::new(HealthChecker::new(
        config,
        registry,
        breaker.clone(),
        reqwest::Client::new(),
    ));
    (checker, breaker, clock)
}

fn fast_config() -> HealthCheckConfig {
    HealthCheckConfig {
        timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

/// Test probing every service concurrently
#[tokio::test]
async fn test_probe_all_services() {
    let healthy = MockServer::start().await;
    let failing = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "ok"})))
        .expect(1)
        .mount(&healthy)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&failing)
        .await;

    let (checker, breaker, _) = checker_for(
        &[("item-service", &healthy), ("list-service", &failing)],
        fast_config(),
    );

    let mut results = checker.probe_all().await;
    results.sort_by(|a, b| a.service.cmp(&b.service));

    assert_eq!(results.len(), 2);
    assert!(results[0].outcome.is_success());
    assert!(!results[1].outcome.is_success());
    assert_eq!(breaker.snapshot("item-service").failures, 0);
    assert_eq!(breaker.snapshot("list-service").failures, 1);
}

/// Test three failing rounds open the circuit
#[tokio::test]
async fn test_failing_probes_open_circuit() {
    let failing = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&failing)
        .await;

    let (checker, breaker, _) = checker_for(&[("list-service", &failing)], fast_config());

    for _ in 0..3 {
        checker.probe_all().await;
    }

    let snapshot = breaker.snapshot("list-service");
    assert_eq!(snapshot.state, CircuitState::Open);
    assert_eq!(snapshot.last_error.as_deref(), Some("upstream returned status 500"));
}

/// Test a healthy probe closes an open circuit
#[tokio::test]
async fn test_healthy_probe_closes_circuit() {
    let recovered = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&recovered)
        .await;

    let (checker, breaker, clock) = checker_for(&[("user-service", &recovered)], fast_config());
    for _ in 0..3 {
        breaker.record_failure("user-service", "connection refused");
    }
    assert!(breaker.is_open("user-service"));

    // Probes are sent even while the circuit is open
    checker.probe_all().await;
    assert!(!breaker.is_open("user-service"));
    assert_eq!(breaker.snapshot("user-service").state, CircuitState::Closed);

    clock.advance(Duration::from_secs(60));
    assert_eq!(breaker.snapshot("user-service").state, CircuitState::Closed);
}

/// Test slow services count as failures
#[tokio::test]
async fn test_probe_timeout_is_failure() {
    let slow = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&slow)
        .await;

    let (checker, breaker, _) = checker_for(&[("item-service", &slow)], fast_config());

    let results = checker.probe_all().await;
    assert_eq!(results.len(), 1);
    assert!(!results[0].outcome.is_success());
    assert!(results[0].latency_ms >= 150);
    assert_eq!(breaker.snapshot("item-service").failures, 1);
}

/// Test the configured probe path is used
#[tokio::test]
async fn test_custom_probe_path() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ready"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = HealthCheckConfig {
        path: "/ready".to_string(),
        ..fast_config()
    };
    let (checker, _, _) = checker_for(&[("item-service", &server)], config);

    let results = checker.probe_all().await;
    assert!(results[0].outcome.is_success());
}

/// Test the background loop probes on its interval
#[tokio::test]
async fn test_background_loop_probes_periodically() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = HealthCheckConfig {
        interval: Duration::from_millis(50),
        ..fast_config()
    };
    let (checker, breaker, _) = checker_for(&[("item-service", &server)], config);

    let (tx, rx) = broadcast::channel(1);
    let handle = checker.start(rx);

    tokio::time::sleep(Duration::from_millis(400)).await;
    tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(breaker.snapshot("item-service").failures >= 3);
    assert!(breaker.is_open("item-service"));
}
