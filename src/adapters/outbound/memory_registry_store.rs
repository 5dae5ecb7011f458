//! In-Memory Registry Store
//!
//! Implements RegistryStore without any persistence. Used when no registry
//! file is configured, and in tests.

use crate::domain::entities::RegistrySnapshot;
use crate::domain::ports::{RegistryStore, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;

/// Snapshot held in process memory.
#[derive(Default)]
pub struct InMemoryRegistryStore {
    snapshot: RwLock<RegistrySnapshot>,
}

impl InMemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn load(&self) -> Result<RegistrySnapshot, StoreError> {
        Ok(self.snapshot.read().clone())
    }

    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError> {
        *self.snapshot.write() = snapshot.clone();
        Ok(())
    }
}
