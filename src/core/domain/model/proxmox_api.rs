//! Response shapes of the Proxmox endpoints the registry consumes.

use serde::{Deserialize, Deserializer, Serialize};

/// One row of `/cluster/status`: either the `cluster` summary or a `node` member.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ClusterStatusEntry {
    #[serde(rename = "type")]
    pub entry_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default, deserialize_with = "flag")]
    pub local: bool,
    #[serde(default)]
    pub nodeid: Option<u32>,
    #[serde(default, deserialize_with = "flag")]
    pub online: bool,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub quorate: bool,
}

impl ClusterStatusEntry {
    pub fn is_cluster(&self) -> bool {
        self.entry_type == "cluster"
    }

    pub fn is_node(&self) -> bool {
        self.entry_type == "node"
    }
}

/// One row of `/nodes/{node}/network`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NodeNetworkInterface {
    #[serde(default)]
    pub iface: String,
    #[serde(rename = "type", default)]
    pub iface_type: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub address6: Option<String>,
    #[serde(default)]
    pub netmask: Option<String>,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub active: bool,
}

/// `/version` on all three products.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProductVersion {
    pub version: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub repoid: String,
}

/// One row of PBS `/admin/datastore`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Datastore {
    pub store: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// API token minted for the monitoring user.
#[derive(Clone, PartialEq, Eq)]
pub struct MonitoringToken {
    /// `user@realm!name`
    pub token_id: String,
    pub token_value: String,
}

impl std::fmt::Debug for MonitoringToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringToken")
            .field("token_id", &self.token_id)
            .field("token_value", &"[redacted]")
            .finish()
    }
}

/// Proxmox encodes booleans as 0/1, sometimes as JSON booleans.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        Some(serde_json::Value::String(s)) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}
