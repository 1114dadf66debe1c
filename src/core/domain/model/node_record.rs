//! The persisted node entity and its kind-specific settings.

use crate::core::domain::{
    model::cluster_endpoint::ClusterEndpoint,
    value_object::{NodeHost, NodeKind},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who introduced a record into the inventory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeSource {
    /// Added by an operator through the UI or API
    #[default]
    Manual,
    /// Registered by the installer script with a setup token
    Script,
    /// Registered by a host agent
    Agent,
}

impl NodeSource {
    /// Parses the free-form `source` field of an auto-register call.
    pub fn from_request(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "agent" => Some(NodeSource::Agent),
            "script" => Some(NodeSource::Script),
            "manual" => Some(NodeSource::Manual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeSource::Manual => "manual",
            NodeSource::Script => "script",
            NodeSource::Agent => "agent",
        }
    }
}

/// Authentication material of a record. Password and token auth are mutually exclusive.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "authMode", rename_all = "camelCase")]
pub enum Credentials {
    #[serde(rename_all = "camelCase")]
    Password { user: String, password: String },
    #[serde(rename_all = "camelCase")]
    Token {
        token_id: String,
        token_value: String,
    },
}

impl Credentials {
    pub fn password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Password {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn token(token_id: impl Into<String>, token_value: impl Into<String>) -> Self {
        Credentials::Token {
            token_id: token_id.into(),
            token_value: token_value.into(),
        }
    }

    pub fn has_password(&self) -> bool {
        matches!(self, Credentials::Password { password, .. } if !password.is_empty())
    }

    pub fn has_token(&self) -> bool {
        matches!(self, Credentials::Token { token_value, .. } if !token_value.is_empty())
    }

    pub fn user(&self) -> Option<&str> {
        match self {
            Credentials::Password { user, .. } => Some(user),
            Credentials::Token { .. } => None,
        }
    }

    pub fn token_id(&self) -> Option<&str> {
        match self {
            Credentials::Token { token_id, .. } => Some(token_id),
            Credentials::Password { .. } => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { user, .. } => f
                .debug_struct("Password")
                .field("user", user)
                .field("password", &"[redacted]")
                .finish(),
            Credentials::Token { token_id, .. } => f
                .debug_struct("Token")
                .field("token_id", token_id)
                .field("token_value", &"[redacted]")
                .finish(),
        }
    }
}

/// PVE monitoring switches and cluster membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PveSettings {
    pub monitor_vms: bool,
    pub monitor_containers: bool,
    pub monitor_storage: bool,
    pub monitor_backups: bool,
    /// `None` leaves the poller's default in place
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_physical_disks: Option<bool>,
    #[serde(default)]
    pub physical_disk_polling_minutes: u32,
    #[serde(default)]
    pub is_cluster: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_endpoints: Vec<ClusterEndpoint>,
}

impl Default for PveSettings {
    fn default() -> Self {
        Self {
            monitor_vms: true,
            monitor_containers: true,
            monitor_storage: true,
            monitor_backups: true,
            monitor_physical_disks: None,
            physical_disk_polling_minutes: 0,
            is_cluster: false,
            cluster_name: String::new(),
            cluster_endpoints: Vec::new(),
        }
    }
}

/// PBS monitoring switches. Job monitoring is opt-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PbsSettings {
    pub monitor_backups: bool,
    pub monitor_datastores: bool,
    pub monitor_sync_jobs: bool,
    pub monitor_verify_jobs: bool,
    pub monitor_prune_jobs: bool,
    pub monitor_garbage_jobs: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_datastores: Vec<String>,
}

impl Default for PbsSettings {
    fn default() -> Self {
        Self {
            monitor_backups: true,
            monitor_datastores: false,
            monitor_sync_jobs: false,
            monitor_verify_jobs: false,
            monitor_prune_jobs: false,
            monitor_garbage_jobs: false,
            exclude_datastores: Vec::new(),
        }
    }
}

/// PMG monitoring switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PmgSettings {
    pub monitor_mail_stats: bool,
    pub monitor_queues: bool,
    pub monitor_quarantine: bool,
    pub monitor_domain_stats: bool,
}

impl Default for PmgSettings {
    fn default() -> Self {
        Self {
            monitor_mail_stats: true,
            monitor_queues: false,
            monitor_quarantine: false,
            monitor_domain_stats: false,
        }
    }
}

/// Kind-specific part of a record. The variant is the record's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeDetails {
    Pve(PveSettings),
    Pbs(PbsSettings),
    Pmg(PmgSettings),
}

impl NodeDetails {
    pub fn defaults_for(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Pve => NodeDetails::Pve(PveSettings::default()),
            NodeKind::Pbs => NodeDetails::Pbs(PbsSettings::default()),
            NodeKind::Pmg => NodeDetails::Pmg(PmgSettings::default()),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeDetails::Pve(_) => NodeKind::Pve,
            NodeDetails::Pbs(_) => NodeKind::Pbs,
            NodeDetails::Pmg(_) => NodeKind::Pmg,
        }
    }
}

/// A node the monitor polls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub name: String,
    pub host: NodeHost,
    /// User-facing link, may differ from the API host
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub guest_url: String,
    pub credentials: Credentials,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub verify_ssl: bool,
    #[serde(default)]
    pub source: NodeSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_monitoring_enabled: Option<bool>,
    #[serde(flatten)]
    pub details: NodeDetails,
}

impl NodeRecord {
    /// A record with kind defaults for every monitoring flag.
    pub fn new(kind: NodeKind, name: impl Into<String>, host: NodeHost, credentials: Credentials) -> Self {
        Self {
            name: name.into(),
            host,
            guest_url: String::new(),
            credentials,
            fingerprint: None,
            verify_ssl: false,
            source: NodeSource::Manual,
            temperature_monitoring_enabled: None,
            details: NodeDetails::defaults_for(kind),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.details.kind()
    }

    pub fn pve(&self) -> Option<&PveSettings> {
        match &self.details {
            NodeDetails::Pve(settings) => Some(settings),
            _ => None,
        }
    }

    pub fn pve_mut(&mut self) -> Option<&mut PveSettings> {
        match &mut self.details {
            NodeDetails::Pve(settings) => Some(settings),
            _ => None,
        }
    }

    pub fn is_cluster(&self) -> bool {
        self.pve().is_some_and(|pve| pve.is_cluster)
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.pve()
            .filter(|pve| pve.is_cluster && !pve.cluster_name.is_empty())
            .map(|pve| pve.cluster_name.as_str())
    }

    /// Stored cluster metadata is missing or a placeholder.
    pub(crate) fn needs_cluster_refresh(&self) -> bool {
        match self.pve() {
            Some(pve) => {
                !pve.is_cluster
                    || pve.cluster_endpoints.is_empty()
                    || pve.cluster_name.trim().is_empty()
                    || pve.cluster_name.eq_ignore_ascii_case("unknown cluster")
            }
            None => false,
        }
    }

    /// Pinned fingerprint, if any.
    pub fn pinned_fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref().filter(|fp| !fp.is_empty())
    }
}
