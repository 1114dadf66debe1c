use crate::core::domain::value_object::serde_helpers;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// One peer inside a PVE cluster, addressable on its own by the poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEndpoint {
    /// Cluster-status ID, e.g. `node/pve2`
    pub node_id: String,
    pub node_name: String,
    /// `scheme://nodename:port`
    pub host: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub guest_url: String,
    /// Address reported by corosync
    #[serde(default)]
    pub ip: String,
    /// Management address chosen over the cluster-internal one
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip_override: String,
    /// Captured on first contact, kept afterwards
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fingerprint: String,
    #[serde(default)]
    pub online: bool,
    #[serde(with = "serde_helpers::system_time")]
    pub last_seen: SystemTime,
}

impl ClusterEndpoint {
    /// The address a poller should dial: the override when set, else the reported IP.
    pub fn effective_ip(&self) -> &str {
        if self.ip_override.is_empty() {
            &self.ip
        } else {
            &self.ip_override
        }
    }
}
