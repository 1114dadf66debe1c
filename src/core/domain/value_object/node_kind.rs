use crate::core::domain::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three Proxmox products the registry can onboard.
///
/// The kind decides the default API port, the realm appended to bare user names
/// and whether the node can take part in a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Proxmox Virtual Environment
    Pve,
    /// Proxmox Backup Server
    Pbs,
    /// Proxmox Mail Gateway
    Pmg,
}

impl NodeKind {
    pub const ALL: [NodeKind; 3] = [NodeKind::Pve, NodeKind::Pbs, NodeKind::Pmg];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Pve => "pve",
            NodeKind::Pbs => "pbs",
            NodeKind::Pmg => "pmg",
        }
    }

    /// API port used when the operator did not give one.
    #[must_use]
    pub fn default_port(&self) -> u16 {
        match self {
            NodeKind::Pve | NodeKind::Pmg => 8006,
            NodeKind::Pbs => 8007,
        }
    }

    /// Realm appended to a user name that carries none.
    #[must_use]
    pub fn default_realm(&self) -> &'static str {
        match self {
            NodeKind::Pve => "pam",
            NodeKind::Pbs => "pbs",
            NodeKind::Pmg => "pmg",
        }
    }

    /// Only PVE nodes form clusters the registry knows how to probe.
    #[must_use]
    pub fn supports_clusters(&self) -> bool {
        matches!(self, NodeKind::Pve)
    }

    /// Cookie carrying the ticket after a password login.
    pub(crate) fn auth_cookie_name(&self) -> &'static str {
        match self {
            NodeKind::Pve => "PVEAuthCookie",
            NodeKind::Pbs => "PBSAuthCookie",
            NodeKind::Pmg => "PMGAuthCookie",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pve" => Ok(NodeKind::Pve),
            "pbs" => Ok(NodeKind::Pbs),
            "pmg" => Ok(NodeKind::Pmg),
            "" => Err(ValidationError::field("type", "Type is required")),
            _ => Err(ValidationError::field(
                "type",
                "Invalid node type. Must be one of: pve, pbs, pmg",
            )),
        }
    }
}
