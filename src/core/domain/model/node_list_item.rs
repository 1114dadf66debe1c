//! Domain model for node list items from the `/nodes` endpoint.

use serde::{Deserialize, Serialize};

/// A node as returned by `/api2/json/nodes`.
///
/// Only the identifying fields are kept; peer validation needs nothing more than a
/// successful, well-formed answer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NodeListItem {
    /// The node name (e.g., "pve1").
    pub node: String,
    /// Current node status (e.g., "online", "offline", "unknown").
    #[serde(default)]
    pub status: String,
    /// Unique node identifier (e.g., "node/pve1").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// SSL fingerprint (if available).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_fingerprint: Option<String>,
}

