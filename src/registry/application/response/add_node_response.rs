use crate::registry::application::response::node_response::NodeResponse;
use serde::Serialize;

/// Reply when a new PVE node turned out to belong to an already configured cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMergeResponse {
    pub success: bool,
    pub merged: bool,
    pub cluster: String,
    pub existing_node: String,
    pub message: String,
    pub total_endpoints: usize,
}

/// Result of an add: a new record, or new peers folded into an existing cluster record.
#[derive(Debug, Clone, PartialEq)]
pub enum AddNodeOutcome {
    Created(NodeResponse),
    Merged(ClusterMergeResponse),
}

impl AddNodeOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, AddNodeOutcome::Merged(_))
    }
}
