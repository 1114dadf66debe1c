use crate::core::domain::value_object::NodeKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The part of the alert configuration the registry touches.
///
/// Overrides are opaque to the registry; it only needs to keep the ones keyed by node
/// identity attached to the right node. Every other setting is carried through as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfig {
    #[serde(default)]
    pub overrides: BTreeMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl AlertConfig {
    /// Override key that follows a node by name. Only PBS overrides are keyed this way.
    pub fn node_override_key(kind: NodeKind, name: &str) -> Option<String> {
        match kind {
            NodeKind::Pbs => Some(format!("pbs-{name}")),
            NodeKind::Pve | NodeKind::Pmg => None,
        }
    }

    /// Moves an override to a new key. Returns `false` when nothing moved.
    pub fn rename_override(&mut self, from: &str, to: &str) -> bool {
        if from == to || self.overrides.contains_key(to) {
            return false;
        }
        match self.overrides.remove(from) {
            Some(value) => {
                self.overrides.insert(to.to_string(), value);
                true
            }
            None => false,
        }
    }
}
