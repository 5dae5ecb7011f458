use crate::domain::value_objects::{ITEM_SERVICE, LIST_SERVICE, USER_SERVICE};
use anyhow::Context;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Gateway settings
    pub listen_addr: String,
    pub debug: bool,
    pub upstream_timeout_ms: u64,

    // Discovery
    /// Fallback service name -> base URL
    pub static_services: BTreeMap<String, String>,
    pub registry_file: Option<String>,
    pub registry_ttl_secs: u64,
    pub registry_sweep_secs: u64,

    // Circuit breaker
    pub breaker_threshold: u32,
    pub breaker_open_ms: u64,

    // Health prober
    pub health_interval_secs: u64,
    pub health_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4000".to_string(),
            debug: false,
            upstream_timeout_ms: 5000,
            static_services: default_static_services(),
            registry_file: None,
            registry_ttl_secs: 60,
            registry_sweep_secs: 15,
            breaker_threshold: 3,
            breaker_open_ms: 30_000,
            health_interval_secs: 30,
            health_path: "/health".to_string(),
        }
    }
}

fn default_static_services() -> BTreeMap<String, String> {
    let mut services = BTreeMap::new();
    services.insert(USER_SERVICE.to_string(), "http://localhost:3001".to_string());
    services.insert(ITEM_SERVICE.to_string(), "http://localhost:3002".to_string());
    services.insert(LIST_SERVICE.to_string(), "http://localhost:3003".to_string());
    services
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Like [`env_or`], but zero also falls back to `default`.
fn env_nonzero(name: &str, default: u64) -> u64 {
    match env_or(name, default) {
        0 => default,
        v => v,
    }
}

/// Read a `{ "<name>": "<url>" }` services file.
pub fn load_services_file(path: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read services file {}", path))?;
    let services: BTreeMap<String, String> = serde_json::from_str(&raw)
        .with_context(|| format!("services file {} is not a name -> url JSON object", path))?;
    Ok(services)
}

pub fn load_config() -> anyhow::Result<Config> {
    let defaults = Config::default();

    let listen_addr = match std::env::var("GATEWAY_LISTEN_ADDR") {
        Ok(addr) => addr,
        Err(_) => match std::env::var("PORT") {
            Ok(port) => format!("0.0.0.0:{}", port.trim()),
            Err(_) => defaults.listen_addr,
        },
    };

    let debug = std::env::var("DEBUG").is_ok();

    let upstream_timeout_ms = env_nonzero("GATEWAY_UPSTREAM_TIMEOUT_MS", defaults.upstream_timeout_ms);

    // Static discovery: defaults, then per-service env vars, then the services file
    let mut static_services = defaults.static_services;
    for (service, var) in [
        (USER_SERVICE, "GATEWAY_USER_SERVICE_URL"),
        (ITEM_SERVICE, "GATEWAY_ITEM_SERVICE_URL"),
        (LIST_SERVICE, "GATEWAY_LIST_SERVICE_URL"),
    ] {
        if let Ok(url) = std::env::var(var) {
            static_services.insert(service.to_string(), url);
        }
    }
    if let Ok(path) = std::env::var("GATEWAY_SERVICES_FILE") {
        static_services.extend(load_services_file(&path)?);
    }

    let registry_file = std::env::var("GATEWAY_REGISTRY_FILE").ok();
    let registry_ttl_secs = env_nonzero("GATEWAY_REGISTRY_TTL_SECS", defaults.registry_ttl_secs);
    let registry_sweep_secs = env_nonzero("GATEWAY_REGISTRY_SWEEP_SECS", defaults.registry_sweep_secs);

    let breaker_threshold = env_or("GATEWAY_BREAKER_THRESHOLD", defaults.breaker_threshold);
    let breaker_open_ms = env_nonzero("GATEWAY_BREAKER_OPEN_MS", defaults.breaker_open_ms);

    let health_interval_secs = env_nonzero("GATEWAY_HEALTH_INTERVAL_SECS", defaults.health_interval_secs);
    let health_path = std::env::var("GATEWAY_HEALTH_PATH").unwrap_or(defaults.health_path);

    Ok(Config {
        listen_addr,
        debug,
        upstream_timeout_ms,
        static_services,
        registry_file,
        registry_ttl_secs,
        registry_sweep_secs,
        breaker_threshold,
        breaker_open_ms,
        health_interval_secs,
        health_path,
    })
}
