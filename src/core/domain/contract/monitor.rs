use crate::core::domain::{
    error::RegistryResult,
    model::{alert_config::AlertConfig, events::RegistryEvent},
    value_object::NodeKind,
};
use async_trait::async_trait;
use serde::Serialize;

/// Connection state the monitor reports for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Connected,
    Disconnected,
    Unknown,
}

/// The polling side of the service, notified after every committed change.
#[async_trait]
pub trait Monitor: Send + Sync {
    /// Re-reads the node inventory and restarts pollers.
    async fn reload(&self) -> RegistryResult<()>;

    async fn apply_alert_config(&self, config: &AlertConfig);

    fn node_status(&self, _kind: NodeKind, _name: &str) -> NodeStatus {
        NodeStatus::Unknown
    }

    /// Forces a discovery scan and returns the fresh result, if discovery is enabled.
    async fn refresh_discovery(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Best-effort fan-out to UI subscribers.
pub trait EventBroadcaster: Send + Sync {
    fn broadcast(&self, event: RegistryEvent);
}

/// Monitor for embeddings that poll nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

#[async_trait]
impl Monitor for NullMonitor {
    async fn reload(&self) -> RegistryResult<()> {
        Ok(())
    }

    async fn apply_alert_config(&self, _config: &AlertConfig) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullBroadcaster;

impl EventBroadcaster for NullBroadcaster {
    fn broadcast(&self, event: RegistryEvent) {
        tracing::trace!(?event, "dropping event, no broadcaster configured");
    }
}
