//! JSON File Registry Store
//!
//! Implements RegistryStore on top of a single pretty-printed JSON file:
//! `{ "services": { "<name>": [ { name, host, port, meta, lastHeartbeat } ] } }`.

use crate::domain::entities::RegistrySnapshot;
use crate::domain::ports::{RegistryStore, StoreError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// File-backed registry store.
///
/// A missing file reads as an empty registry. Writes go to a temporary
/// sibling file first and are renamed into place.
pub struct JsonFileRegistryStore {
    path: PathBuf,
}

impl JsonFileRegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RegistryStore for JsonFileRegistryStore {
    async fn load(&self) -> Result<RegistrySnapshot, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(RegistrySnapshot::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("registry file {} not found, starting empty", self.path.display());
                Ok(RegistrySnapshot::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
