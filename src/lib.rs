//! Edge Gateway Library
//!
//! This module exposes the gateway components for use in integration tests
//! and as a library.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::inbound::{router, ApiServer, ApiState};
pub use application::{AggregationService, ProxyService};
pub use config::{load_config, Config};
pub use domain::entities::{RegistrySnapshot, ServiceAddress, ServiceRegistration};
pub use domain::ports::{Clock, RegistryStore};
pub use domain::value_objects::RouteTable;
pub use infrastructure::{CircuitBreaker, CircuitBreakerConfig, HealthChecker, ServiceRegistry};
