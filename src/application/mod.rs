//! Application Layer
//!
//! Use cases orchestrating the registry and the circuit breaker: single
//! request forwarding and multi-backend aggregation.

pub mod aggregation_service;
pub mod proxy_service;
pub mod token;

pub use aggregation_service::{AggregationError, AggregationService, Branch};
pub use proxy_service::{ForwardError, ForwardRequest, ProxyService, UpstreamResponse};
pub use token::subject_from_authorization;
