//! Adapters
//!
//! Inbound: the gateway HTTP server. Outbound: registry persistence.

pub mod inbound;
pub mod outbound;
