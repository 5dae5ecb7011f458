//! Active Health Checker
//!
//! Periodically probes every known service over HTTP and feeds the result
//! into the circuit breaker with the same classification live traffic
//! uses, so circuits recover or trip even when no client calls arrive.

use crate::domain::{CallOutcome, ServiceAddress};
use crate::infrastructure::{CircuitBreaker, ServiceRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Interval between probe rounds
    pub interval: Duration,
    /// Timeout for each probe
    pub timeout: Duration,
    /// Path probed on every service
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            path: "/health".to_string(),
        }
    }
}

/// Result of probing one service.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub service: String,
    pub outcome: CallOutcome,
    pub latency_ms: u64,
}

/// Active health checker for backend services.
pub struct HealthChecker {
    config: HealthCheckConfig,
    registry: Arc<ServiceRegistry>,
    breaker: Arc<CircuitBreaker>,
    client: reqwest::Client,
}

impl HealthChecker {
    pub fn new(
        config: HealthCheckConfig,
        registry: Arc<ServiceRegistry>,
        breaker: Arc<CircuitBreaker>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            registry,
            breaker,
            client,
        }
    }

    /// Start the probe loop. Stops when `shutdown` fires.
    pub fn start(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        let period = if self.config.interval.is_zero() {
            tracing::warn!("health check interval is zero, using 1s");
            Duration::from_secs(1)
        } else {
            self.config.interval
        };

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately; give services a full interval to come up.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.recv() => break,
                }
                self.probe_all().await;
            }
        })
    }

    /// Probe every known service concurrently and record the outcomes.
    pub async fn probe_all(&self) -> Vec<HealthCheckResult> {
        let probes: Vec<_> = self
            .registry
            .known_services()
            .into_iter()
            .filter_map(|service| {
                let address = self.registry.resolve(&service)?;
                Some(async move { self.probe(service, address).await })
            })
            .collect();

        let results = futures::future::join_all(probes).await;

        for result in &results {
            self.breaker.record(&result.service, &result.outcome);
        }
        results
    }

    /// Probe one service.
    async fn probe(&self, service: String, address: ServiceAddress) -> HealthCheckResult {
        let url = address.url_for(&self.config.path);
        let start = Instant::now();

        let outcome = match self
            .client
            .get(&url)
            .timeout(self.config.timeout)
            .send()
            .await
        {
            Ok(resp) => CallOutcome::from_status(resp.status().as_u16()),
            Err(e) => CallOutcome::transport(format!("health probe failed: {}", e)),
        };

        let latency_ms = start.elapsed().as_millis() as u64;

        if let CallOutcome::Failure(reason) = &outcome {
            tracing::warn!("service {} unhealthy at {} after {}ms: {}", service, url, latency_ms, reason);
        } else {
            tracing::debug!("service {} healthy at {} in {}ms", service, url, latency_ms);
        }

        HealthCheckResult {
            service,
            outcome,
            latency_ms,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::CircuitBreakerConfig;
    use std::collections::HashMap;

    fn checker(statics: HashMap<String, ServiceAddress>) -> HealthChecker {
        let clock = Arc::new(ManualClock::new(0));
        let registry = Arc::new(ServiceRegistry::new(clock.clone(), statics));
        let breaker = Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig {
                failure_threshold: 1,
                ..Default::default()
            },
            clock,
        ));
        HealthChecker::new(
            HealthCheckConfig {
                timeout: Duration::from_millis(200),
                ..Default::default()
            },
            registry,
            breaker,
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_health_check_config_default() {
        let config = HealthCheckConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.path, "/health");
    }

    #[tokio::test]
    async fn test_probe_all_without_services() {
        let checker = checker(HashMap::new());
        assert!(checker.probe_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_service_trips_breaker() {
        let mut statics = HashMap::new();
        statics.insert("down".to_string(), ServiceAddress::new("127.0.0.1", 9));
        let checker = checker(statics);

        let results = checker.probe_all().await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].outcome.is_success());
        assert!(checker.breaker.is_open("down"));
    }

    #[tokio::test]
    async fn test_start_stops_on_shutdown() {
        let checker = Arc::new(checker(HashMap::new()));
        let (tx, rx) = broadcast::channel(1);
        let handle = checker.start(rx);

        tx.send(()).unwrap();
        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(joined.is_ok());
    }

    #[tokio::test]
    async fn test_zero_interval_does_not_kill_loop() {
        let checker = Arc::new(HealthChecker::new(
            HealthCheckConfig {
                interval: Duration::ZERO,
                ..Default::default()
            },
            Arc::new(ServiceRegistry::new(Arc::new(ManualClock::new(0)), HashMap::new())),
            Arc::new(CircuitBreaker::default()),
            reqwest::Client::new(),
        ));
        let (tx, rx) = broadcast::channel(1);
        let handle = checker.start(rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        let joined = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(joined.unwrap().is_ok());
    }
}
