use crate::registry::application::response::add_node_response::ClusterMergeResponse;
use serde::Serialize;

#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoRegisterResponse {
    pub status: &'static str,
    pub message: String,
    pub node_id: String,
    /// Only set when the registry minted the token for the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,
}

impl std::fmt::Debug for AutoRegisterResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoRegisterResponse")
            .field("status", &self.status)
            .field("message", &self.message)
            .field("node_id", &self.node_id)
            .field("token_id", &self.token_id)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

/// Result of an auto-registration.
///
/// A node whose cluster is already represented is folded into that record; the reply
/// then describes the merge instead of a new node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AutoRegisterOutcome {
    Registered(AutoRegisterResponse),
    Merged(ClusterMergeResponse),
}

impl AutoRegisterOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, AutoRegisterOutcome::Merged(_))
    }
}
