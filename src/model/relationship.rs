//! Relationship (edge) in the property graph.

use serde::{Deserialize, Serialize};
use super::{NodeId, PropertyMap};

/// Store-assigned relationship identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelId(pub u64);

impl std::fmt::Display for RelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traversal direction, seen from the node a relationship is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    Both,
}

impl Direction {
    /// Whether `rel` is visible from `node` in this direction.
    pub fn matches(self, rel: &Relationship, node: NodeId) -> bool {
        match self {
            Direction::Outgoing => rel.src == node,
            Direction::Incoming => rel.dst == node,
            Direction::Both => rel.src == node || rel.dst == node,
        }
    }
}

/// A relationship (directed edge) snapshot as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelId,
    pub src: NodeId,
    pub dst: NodeId,
    pub rel_type: String,
    pub properties: PropertyMap,
}

impl Relationship {
    pub fn new(id: RelId, src: NodeId, dst: NodeId, rel_type: impl Into<String>) -> Self {
        Self {
            id,
            src,
            dst,
            rel_type: rel_type.into(),
            properties: PropertyMap::new(),
        }
    }

    /// The "other" end of the relationship from the given node.
    pub fn other_node(&self, from: NodeId) -> Option<NodeId> {
        if from == self.src { Some(self.dst) }
        else if from == self.dst { Some(self.src) }
        else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_matches() {
        let rel = Relationship::new(RelId(1), NodeId(1), NodeId(2), "KNOWS");
        assert!(Direction::Outgoing.matches(&rel, NodeId(1)));
        assert!(!Direction::Outgoing.matches(&rel, NodeId(2)));
        assert!(Direction::Incoming.matches(&rel, NodeId(2)));
        assert!(Direction::Both.matches(&rel, NodeId(2)));
    }

    #[test]
    fn test_other_node() {
        let rel = Relationship::new(RelId(1), NodeId(1), NodeId(2), "KNOWS");
        assert_eq!(rel.other_node(NodeId(1)), Some(NodeId(2)));
        assert_eq!(rel.other_node(NodeId(2)), Some(NodeId(1)));
        assert_eq!(rel.other_node(NodeId(3)), None);
    }
}
