//! Edge Gateway - API gateway with service discovery and circuit breaking
//!
//! This is the composition root that wires together all the components.

use edge_gateway::adapters::inbound::{ApiServer, ApiState};
use edge_gateway::adapters::outbound::{InMemoryRegistryStore, JsonFileRegistryStore};
use edge_gateway::application::ProxyService;
use edge_gateway::config::load_config;
use edge_gateway::domain::ports::{Clock, RegistryStore};
use edge_gateway::domain::{RouteTable, ServiceAddress};
use edge_gateway::infrastructure::{
    shutdown_signal, CircuitBreaker, CircuitBreakerConfig, HealthCheckConfig, HealthChecker,
    ServiceRegistry, ShutdownController, SystemClock,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting edge-gateway listen={} services={}",
        cfg.listen_addr,
        cfg.static_services.len()
    );

    // ===== COMPOSITION ROOT =====

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 1. Static discovery fallback
    let mut static_services = HashMap::new();
    for (name, url) in &cfg.static_services {
        match ServiceAddress::parse(url) {
            Some(address) => {
                static_services.insert(name.clone(), address);
            }
            None => tracing::warn!("ignoring static service {}: invalid url {}", name, url),
        }
    }

    // 2. Registry persistence
    let store: Arc<dyn RegistryStore> = match &cfg.registry_file {
        Some(path) => {
            let store = JsonFileRegistryStore::new(path);
            tracing::info!("registry persisted to {}", store.path().display());
            Arc::new(store)
        }
        None => Arc::new(InMemoryRegistryStore::new()),
    };

    let registry = Arc::new(ServiceRegistry::new(clock.clone(), static_services).with_store(store));
    match registry.load().await {
        Ok(count) => tracing::info!("restored {} registered instances", count),
        Err(e) => tracing::error!("failed to load registry, starting empty: {}", e),
    }

    // 3. Circuit breaker and upstream client
    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig {
            failure_threshold: cfg.breaker_threshold,
            open_window: Duration::from_millis(cfg.breaker_open_ms),
        },
        clock,
    ));
    let timeout = Duration::from_millis(cfg.upstream_timeout_ms);
    let client = ProxyService::build_client(timeout)?;

    // 4. Application services
    let proxy = Arc::new(ProxyService::new(
        registry.clone(),
        breaker.clone(),
        client.clone(),
    ));
    let state = ApiState::new(proxy, RouteTable::default());

    // 5. Background tasks
    let shutdown = ShutdownController::new();

    let sweeper = registry.start_sweeper(
        Duration::from_secs(cfg.registry_ttl_secs),
        Duration::from_secs(cfg.registry_sweep_secs),
        shutdown.subscribe(),
    );

    let checker = Arc::new(HealthChecker::new(
        HealthCheckConfig {
            interval: Duration::from_secs(cfg.health_interval_secs),
            timeout,
            path: cfg.health_path.clone(),
        },
        registry.clone(),
        breaker,
        client,
    ));
    let prober = checker.start(shutdown.subscribe());

    // 6. Serve until signalled
    let server = ApiServer::new(cfg.listen_addr.clone(), state);
    let result = server.run(shutdown_signal(shutdown.clone())).await;

    if !shutdown.is_shutdown() {
        tracing::warn!("server stopped without a shutdown signal, stopping background tasks");
        shutdown.shutdown();
    }
    let _ = tokio::join!(sweeper, prober);

    if let Err(e) = registry.flush().await {
        tracing::error!("failed to persist registry on shutdown: {}", e);
    }
    tracing::info!("edge-gateway stopped");

    result
}
