//! The owned node inventory: three ordered lists, one per kind.

use crate::core::domain::{
    model::node_record::NodeRecord,
    value_object::{NodeHost, NodeId, NodeKind},
};
use serde::{Deserialize, Serialize};

/// Every record known to one organization.
///
/// The position of a record inside its kind's list is its [`NodeId`]. All dedup
/// rules that the registration engine relies on are answered here, against one
/// consistent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInventory {
    #[serde(default)]
    pub pve: Vec<NodeRecord>,
    #[serde(default)]
    pub pbs: Vec<NodeRecord>,
    #[serde(default)]
    pub pmg: Vec<NodeRecord>,
}

impl NodeInventory {
    pub fn nodes(&self, kind: NodeKind) -> &[NodeRecord] {
        match kind {
            NodeKind::Pve => &self.pve,
            NodeKind::Pbs => &self.pbs,
            NodeKind::Pmg => &self.pmg,
        }
    }

    pub(crate) fn nodes_mut(&mut self, kind: NodeKind) -> &mut Vec<NodeRecord> {
        match kind {
            NodeKind::Pve => &mut self.pve,
            NodeKind::Pbs => &mut self.pbs,
            NodeKind::Pmg => &mut self.pmg,
        }
    }

    pub fn len(&self) -> usize {
        self.pve.len() + self.pbs.len() + self.pmg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes(id.kind()).get(id.index())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut NodeRecord> {
        self.nodes_mut(id.kind()).get_mut(id.index())
    }

    /// All records with their current IDs, PVE first.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &NodeRecord)> {
        NodeKind::ALL.into_iter().flat_map(move |kind| {
            self.nodes(kind)
                .iter()
                .enumerate()
                .map(move |(index, record)| (NodeId::new(kind, index), record))
        })
    }

    /// Appends a record to its kind's list and returns its ID.
    pub fn insert(&mut self, record: NodeRecord) -> NodeId {
        let kind = record.kind();
        let list = self.nodes_mut(kind);
        list.push(record);
        NodeId::new(kind, list.len() - 1)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<NodeRecord> {
        let list = self.nodes_mut(id.kind());
        (id.index() < list.len()).then(|| list.remove(id.index()))
    }

    pub fn find_by_host(&self, kind: NodeKind, host: &NodeHost) -> Option<NodeId> {
        self.nodes(kind)
            .iter()
            .position(|record| &record.host == host)
            .map(|index| NodeId::new(kind, index))
    }

    /// Whether a record other than `except` already owns `host`.
    pub fn host_taken(&self, kind: NodeKind, host: &NodeHost, except: Option<NodeId>) -> bool {
        self.nodes(kind)
            .iter()
            .enumerate()
            .any(|(index, record)| {
                &record.host == host && except != Some(NodeId::new(kind, index))
            })
    }

    /// The PVE record that represents cluster `name`.
    pub fn find_cluster(&self, name: &str) -> Option<NodeId> {
        if name.is_empty() {
            return None;
        }
        self.pve
            .iter()
            .position(|record| record.cluster_name() == Some(name))
            .map(|index| NodeId::new(NodeKind::Pve, index))
    }

    /// Display name for a new record: `name` unless another record of the kind already
    /// uses it (case-insensitively) for a different host, then `name (hostname)`.
    pub fn disambiguate_name(&self, kind: NodeKind, name: &str, host: &NodeHost) -> String {
        let clash = self
            .nodes(kind)
            .iter()
            .any(|record| record.name.eq_ignore_ascii_case(name) && &record.host != host);
        if clash {
            format!("{} ({})", name, host.hostname())
        } else {
            name.to_string()
        }
    }
}
