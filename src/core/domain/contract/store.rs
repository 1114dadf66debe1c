use crate::core::domain::{
    error::RegistryResult,
    model::{alert_config::AlertConfig, inventory::NodeInventory},
};
use async_trait::async_trait;

/// Durable home of the node inventory. Saves replace the whole inventory atomically.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn load_nodes(&self) -> RegistryResult<NodeInventory>;

    async fn save_nodes(&self, inventory: &NodeInventory) -> RegistryResult<()>;
}

#[async_trait]
pub trait AlertConfigStore: Send + Sync {
    async fn load_alert_config(&self) -> RegistryResult<AlertConfig>;

    async fn save_alert_config(&self, config: &AlertConfig) -> RegistryResult<()>;
}
