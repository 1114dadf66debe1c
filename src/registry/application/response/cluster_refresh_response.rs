use crate::core::domain::model::cluster_endpoint::ClusterEndpoint;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRefreshResponse {
    pub status: &'static str,
    pub cluster_name: String,
    pub old_node_count: usize,
    pub new_node_count: usize,
    /// Negative when peers left the cluster
    pub nodes_added: i64,
    pub cluster_nodes: Vec<ClusterEndpoint>,
}
