//! Infrastructure Layer
//!
//! Shared gateway state (circuit breaker, service registry) and the
//! background machinery around it.

pub mod circuit_breaker;
pub mod clock;
pub mod health_checker;
pub mod service_registry;
pub mod shutdown;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState};
pub use clock::{ManualClock, SystemClock};
pub use health_checker::{HealthCheckConfig, HealthCheckResult, HealthChecker};
pub use service_registry::ServiceRegistry;
pub use shutdown::{shutdown_signal, ShutdownController};
