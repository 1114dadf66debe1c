use crate::core::domain::{
    contract::NodeStatus,
    model::{
        cluster_endpoint::ClusterEndpoint,
        node_record::{NodeDetails, NodeRecord},
    },
    value_object::{NodeId, NodeKind},
};
use serde::Serialize;

/// A node as shown to the UI. Secrets are reduced to `hasPassword` / `hasToken`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeKind,
    pub name: String,
    pub host: String,
    #[serde(rename = "guestURL", skip_serializing_if = "String::is_empty")]
    pub guest_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user: String,
    pub has_password: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub token_name: String,
    pub has_token: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fingerprint: String,
    #[serde(rename = "verifySSL")]
    pub verify_ssl: bool,
    #[serde(rename = "monitorVMs", skip_serializing_if = "is_false")]
    pub monitor_vms: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub monitor_containers: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub monitor_storage: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub monitor_backups: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor_physical_disks: Option<bool>,
    #[serde(skip_serializing_if = "is_zero")]
    pub physical_disk_polling_minutes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_monitoring_enabled: Option<bool>,
    #[serde(skip_serializing_if = "is_false")]
    pub monitor_datastores: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub monitor_sync_jobs: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub monitor_verify_jobs: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub monitor_prune_jobs: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub monitor_garbage_jobs: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude_datastores: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub monitor_mail_stats: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub monitor_queues: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub monitor_quarantine: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub monitor_domain_stats: bool,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "is_false")]
    pub is_cluster: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cluster_endpoints: Vec<ClusterEndpoint>,
    pub source: &'static str,
}

impl NodeResponse {
    pub fn from_record(id: NodeId, record: &NodeRecord, status: NodeStatus) -> Self {
        let mut response = Self {
            id: id.to_string(),
            node_type: record.kind(),
            name: record.name.clone(),
            host: record.host.to_string(),
            guest_url: record.guest_url.clone(),
            user: record.credentials.user().unwrap_or_default().to_string(),
            has_password: record.credentials.has_password(),
            token_name: record.credentials.token_id().unwrap_or_default().to_string(),
            has_token: record.credentials.has_token(),
            fingerprint: record.fingerprint.clone().unwrap_or_default(),
            verify_ssl: record.verify_ssl,
            monitor_vms: false,
            monitor_containers: false,
            monitor_storage: false,
            monitor_backups: false,
            monitor_physical_disks: None,
            physical_disk_polling_minutes: 0,
            temperature_monitoring_enabled: record.temperature_monitoring_enabled,
            monitor_datastores: false,
            monitor_sync_jobs: false,
            monitor_verify_jobs: false,
            monitor_prune_jobs: false,
            monitor_garbage_jobs: false,
            exclude_datastores: Vec::new(),
            monitor_mail_stats: false,
            monitor_queues: false,
            monitor_quarantine: false,
            monitor_domain_stats: false,
            status,
            is_cluster: false,
            cluster_name: String::new(),
            cluster_endpoints: Vec::new(),
            source: record.source.as_str(),
        };

        match &record.details {
            NodeDetails::Pve(pve) => {
                response.monitor_vms = pve.monitor_vms;
                response.monitor_containers = pve.monitor_containers;
                response.monitor_storage = pve.monitor_storage;
                response.monitor_backups = pve.monitor_backups;
                response.monitor_physical_disks = pve.monitor_physical_disks;
                response.physical_disk_polling_minutes = pve.physical_disk_polling_minutes;
                response.is_cluster = pve.is_cluster;
                response.cluster_name = pve.cluster_name.clone();
                response.cluster_endpoints = pve.cluster_endpoints.clone();
            }
            NodeDetails::Pbs(pbs) => {
                response.monitor_backups = pbs.monitor_backups;
                response.monitor_datastores = pbs.monitor_datastores;
                response.monitor_sync_jobs = pbs.monitor_sync_jobs;
                response.monitor_verify_jobs = pbs.monitor_verify_jobs;
                response.monitor_prune_jobs = pbs.monitor_prune_jobs;
                response.monitor_garbage_jobs = pbs.monitor_garbage_jobs;
                response.exclude_datastores = pbs.exclude_datastores.clone();
            }
            NodeDetails::Pmg(pmg) => {
                response.monitor_mail_stats = pmg.monitor_mail_stats;
                response.monitor_queues = pmg.monitor_queues;
                response.monitor_quarantine = pmg.monitor_quarantine;
                response.monitor_domain_stats = pmg.monitor_domain_stats;
            }
        }
        response
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}
