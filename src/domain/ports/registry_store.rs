//! Registry Store Port
//!
//! Defines the interface for persisting the service registry.
//! Implementations may use a JSON file, memory, or a networked store.

use crate::domain::entities::RegistrySnapshot;
use async_trait::async_trait;

/// Errors raised by registry stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("registry store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("registry snapshot is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value store holding the whole registry as one snapshot.
///
/// The registry only ever reads the full snapshot at startup and writes
/// the full snapshot back after mutations.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Load the last saved snapshot. A store that was never written
    /// returns an empty snapshot.
    async fn load(&self) -> Result<RegistrySnapshot, StoreError>;

    /// Replace the stored snapshot.
    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError>;
}
