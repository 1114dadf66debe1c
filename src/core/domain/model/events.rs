use crate::core::domain::value_object::{NodeKind, serde_helpers};
use serde::Serialize;
use std::time::SystemTime;

/// Event published to UI subscribers after a committed change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryEvent {
    #[serde(flatten)]
    pub payload: EventPayload,
    #[serde(with = "serde_helpers::system_time")]
    pub timestamp: SystemTime,
}

impl RegistryEvent {
    pub fn now(payload: EventPayload) -> Self {
        Self {
            payload,
            timestamp: SystemTime::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    #[serde(rename_all = "camelCase")]
    NodeAutoRegistered {
        #[serde(rename = "type")]
        node_type: NodeKind,
        host: String,
        name: String,
        token_id: String,
        has_token: bool,
        #[serde(rename = "verifySSL")]
        verify_ssl: bool,
        status: String,
    },
    #[serde(rename_all = "camelCase")]
    NodeDeleted { node_type: NodeKind },
    #[serde(rename_all = "camelCase")]
    NodesUpdated { node_type: NodeKind, action: String },
    DiscoveryUpdate { servers: serde_json::Value },
}
