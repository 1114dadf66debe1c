use crate::core::domain::{error::ValidationError, value_object::NodeKind};
use std::fmt;
use std::str::FromStr;

/// Position of a record inside its kind's list, rendered as `<kind>-<index>`.
///
/// IDs are rewritten whenever a list changes order, so they are only stable for the
/// lifetime of one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    kind: NodeKind,
    index: usize,
}

impl NodeId {
    #[must_use]
    pub fn new(kind: NodeKind, index: usize) -> Self {
        Self { kind, index }
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.index)
    }
}

impl FromStr for NodeId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::field("id", "Invalid node ID");
        let parts: Vec<&str> = value.split('-').collect();
        if parts.len() != 2 {
            return Err(invalid());
        }
        let kind = parts[0].parse::<NodeKind>().map_err(|_| invalid())?;
        if parts[1].is_empty() || !parts[1].chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let index = parts[1].parse::<usize>().map_err(|_| invalid())?;
        Ok(Self { kind, index })
    }
}
