use crate::core::domain::model::cluster_endpoint::ClusterEndpoint;

/// Name used when a cluster does not report one.
pub const UNKNOWN_CLUSTER: &str = "Unknown Cluster";

/// Outcome of probing a PVE endpoint for cluster membership.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterDetection {
    pub is_cluster: bool,
    pub cluster_name: String,
    pub endpoints: Vec<ClusterEndpoint>,
}

impl ClusterDetection {
    pub fn standalone() -> Self {
        Self::default()
    }

    pub fn clustered(name: impl Into<String>, endpoints: Vec<ClusterEndpoint>) -> Self {
        Self {
            is_cluster: true,
            cluster_name: name.into(),
            endpoints,
        }
    }

    /// Flagged as a cluster and carrying a name to merge on.
    pub fn is_mergeable(&self) -> bool {
        self.is_cluster && !self.cluster_name.is_empty()
    }
}

/// Blank and placeholder names carry no identity.
pub fn is_placeholder_cluster_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.eq_ignore_ascii_case(UNKNOWN_CLUSTER)
}
