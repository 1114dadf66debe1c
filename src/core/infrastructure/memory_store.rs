use crate::core::domain::{
    contract::{AlertConfigStore, NodeStore},
    error::{RegistryError, RegistryResult},
    model::{alert_config::AlertConfig, inventory::NodeInventory},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-process store, for embeddings without a disk and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    nodes: Mutex<NodeInventory>,
    alerts: Mutex<AlertConfig>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_nodes(inventory: NodeInventory) -> Self {
        Self {
            nodes: Mutex::new(inventory),
            ..Self::default()
        }
    }

    pub fn with_alerts(self, config: AlertConfig) -> Self {
        *self.alerts.lock() = config;
        self
    }

    /// Copy of what was last saved.
    pub fn snapshot(&self) -> NodeInventory {
        self.nodes.lock().clone()
    }

    pub fn alerts_snapshot(&self) -> AlertConfig {
        self.alerts.lock().clone()
    }

    /// Number of successful node saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Makes every following save fail.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn load_nodes(&self) -> RegistryResult<NodeInventory> {
        Ok(self.nodes.lock().clone())
    }

    async fn save_nodes(&self, inventory: &NodeInventory) -> RegistryResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RegistryError::Persistence("store is read-only".to_string()));
        }
        *self.nodes.lock() = inventory.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl AlertConfigStore for MemoryStore {
    async fn load_alert_config(&self) -> RegistryResult<AlertConfig> {
        Ok(self.alerts.lock().clone())
    }

    async fn save_alert_config(&self, config: &AlertConfig) -> RegistryResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RegistryError::Persistence("store is read-only".to_string()));
        }
        *self.alerts.lock() = config.clone();
        Ok(())
    }
}
