//! JSON-file persistence for the node inventory and alert configuration.

use crate::core::domain::{
    contract::{AlertConfigStore, NodeStore},
    error::{RegistryError, RegistryResult},
    model::{alert_config::AlertConfig, inventory::NodeInventory},
};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};

const NODES_FILE: &str = "nodes.json";
const ALERTS_FILE: &str = "alerts.json";

/// Stores `nodes.json` and `alerts.json` in one directory.
///
/// Saves write a sibling temporary file and rename it over the target, so readers see
/// either the previous or the new inventory, never a partial one.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read<T>(&self, file: &str) -> RegistryResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.dir.join(file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => {
                return Err(RegistryError::Persistence(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            RegistryError::Persistence(format!("parsing {}: {}", path.display(), e))
        })
    }

    async fn write<T: Serialize>(&self, file: &str, value: &T) -> RegistryResult<()> {
        let persistence = |e: std::io::Error| RegistryError::Persistence(e.to_string());
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(persistence)?;

        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{file}.tmp"));
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| RegistryError::Persistence(e.to_string()))?;
        tokio::fs::write(&tmp, bytes).await.map_err(persistence)?;
        tokio::fs::rename(&tmp, &path).await.map_err(persistence)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

#[async_trait]
impl NodeStore for JsonFileStore {
    async fn load_nodes(&self) -> RegistryResult<NodeInventory> {
        self.read(NODES_FILE).await
    }

    async fn save_nodes(&self, inventory: &NodeInventory) -> RegistryResult<()> {
        self.write(NODES_FILE, inventory).await
    }
}

#[async_trait]
impl AlertConfigStore for JsonFileStore {
    async fn load_alert_config(&self) -> RegistryResult<AlertConfig> {
        self.read(ALERTS_FILE).await
    }

    async fn save_alert_config(&self, config: &AlertConfig) -> RegistryResult<()> {
        self.write(ALERTS_FILE, config).await
    }
}
