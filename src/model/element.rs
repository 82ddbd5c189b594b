//! Identity of the graph element backing an entity.

use serde::{Deserialize, Serialize};
use super::{NodeId, RelId};

/// A node or relationship, by store identity.
///
/// Once assigned to an entity this never changes for that instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphElement {
    Node(NodeId),
    Relationship(RelId),
}

impl GraphElement {
    /// The numeric store identity.
    pub fn id(&self) -> u64 {
        match self {
            GraphElement::Node(id) => id.0,
            GraphElement::Relationship(id) => id.0,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            GraphElement::Node(id) => Some(*id),
            GraphElement::Relationship(_) => None,
        }
    }

    pub fn as_relationship(&self) -> Option<RelId> {
        match self {
            GraphElement::Relationship(id) => Some(*id),
            GraphElement::Node(_) => None,
        }
    }
}

impl std::fmt::Display for GraphElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphElement::Node(id) => write!(f, "Node[{id}]"),
            GraphElement::Relationship(id) => write!(f, "Relationship[{id}]"),
        }
    }
}

impl From<NodeId> for GraphElement {
    fn from(id: NodeId) -> Self { GraphElement::Node(id) }
}

impl From<RelId> for GraphElement {
    fn from(id: RelId) -> Self { GraphElement::Relationship(id) }
}
