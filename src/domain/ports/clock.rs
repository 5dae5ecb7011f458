//! Clock Port
//!
//! Time source for breaker windows and heartbeat ages. Injected so tests
//! can drive time by hand.

/// Wall-clock time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}
