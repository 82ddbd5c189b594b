//! # Graph Store Trait
//!
//! This is THE contract between the mapping layer and a graph engine.
//! The entity-state machinery only ever talks to a store through it.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory reference store with snapshot rollback |
//!
//! All calls are synchronous. Mutating calls require a running transaction;
//! reads do not.

pub mod memory;

use crate::index::{IndexQuery, IndexType, IndexValue};
use crate::model::*;
use crate::tx::{TxId, TxMode};
use crate::Result;

pub use memory::MemoryStore;

// ============================================================================
// Expand depth specification
// ============================================================================

/// Depth specification for graph expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandDepth {
    /// Exact depth
    Exact(usize),
    /// Range: min..max (inclusive)
    Range { min: usize, max: usize },
    /// Unbounded (up to the given safety limit)
    Unbounded(usize),
}

impl ExpandDepth {
    pub fn bounds(self) -> (usize, usize) {
        match self {
            ExpandDepth::Exact(d) => (d, d),
            ExpandDepth::Range { min, max } => (min, max),
            ExpandDepth::Unbounded(limit) => (1, limit),
        }
    }
}

// ============================================================================
// GraphStore Trait
// ============================================================================

/// The store contract consumed by accessors and entity states.
///
/// The trait is object-safe; the mapping context holds it as
/// `Arc<dyn GraphStore>`.
pub trait GraphStore: Send + Sync + 'static {
    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a transaction. Beginning while one is running joins it.
    fn begin_tx(&self, mode: TxMode) -> Result<TxId>;

    /// Commit a transaction. Committing a joined transaction only leaves it.
    fn commit_tx(&self, tx: TxId) -> Result<()>;

    /// Roll back a transaction. Rolling back a joined transaction marks the
    /// outermost one rollback-only.
    fn rollback_tx(&self, tx: TxId) -> Result<()>;

    /// Whether a transaction is currently active.
    fn is_transaction_running(&self) -> bool;

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node with the given labels and properties.
    fn create_node(&self, labels: &[&str], props: PropertyMap) -> Result<NodeId>;

    /// Get a node by ID. Returns None if not found.
    fn get_node(&self, id: NodeId) -> Result<Option<Node>>;

    /// Delete a node. Returns true if it existed.
    /// Fails if the node still has relationships.
    fn delete_node(&self, id: NodeId) -> Result<bool>;

    /// Delete a node and all its relationships in one operation.
    ///
    /// Default: get all relationships, delete each, then delete the node.
    fn detach_delete_node(&self, id: NodeId) -> Result<bool> {
        let rels = self.get_relationships(id, Direction::Both, None)?;
        for rel in &rels {
            self.delete_relationship(rel.id)?;
        }
        self.delete_node(id)
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    /// Create a relationship between two nodes.
    fn create_relationship(
        &self,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId>;

    /// Get a relationship by ID.
    fn get_relationship(&self, id: RelId) -> Result<Option<Relationship>>;

    /// Delete a relationship. Returns true if it existed.
    fn delete_relationship(&self, id: RelId) -> Result<bool>;

    // ========================================================================
    // Element properties
    // ========================================================================

    fn has_property(&self, element: GraphElement, key: &str) -> Result<bool>;

    /// Read a property. A missing key is `Error::NotFound`.
    fn get_property(&self, element: GraphElement, key: &str) -> Result<Value>;

    /// Set a property (upsert).
    fn set_property(&self, element: GraphElement, key: &str, val: Value) -> Result<()>;

    /// Remove a property. Removing a missing key is not an error.
    fn remove_property(&self, element: GraphElement, key: &str) -> Result<()>;

    fn property_keys(&self, element: GraphElement) -> Result<Vec<String>>;

    /// Read a property, `None` when absent.
    fn get_property_opt(&self, element: GraphElement, key: &str) -> Result<Option<Value>> {
        if self.has_property(element, key)? {
            self.get_property(element, key).map(Some)
        } else {
            Ok(None)
        }
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Get all relationships of a node, optionally filtered by direction and type.
    fn get_relationships(
        &self,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    /// Expand from a node: breadth-first traversal to the given depth.
    /// Paths never revisit a node.
    fn expand(
        &self,
        node: NodeId,
        dir: Direction,
        rel_types: &[&str],
        depth: ExpandDepth,
    ) -> Result<Vec<Path>> {
        let (min_depth, max_depth) = depth.bounds();
        let start = self
            .get_node(node)?
            .ok_or_else(|| crate::Error::NotFound(format!("Node {node}")))?;

        let mut results = Vec::new();
        if min_depth == 0 {
            results.push(Path::single(start.clone()));
        }
        let mut queue = vec![Path::single(start)];

        for current_depth in 0..max_depth {
            let mut next_queue = Vec::new();

            for path in &queue {
                let Some(tip) = path.end() else { continue };
                let tip_id = tip.id;
                for rel in self.get_relationships(tip_id, dir, None)? {
                    if !rel_types.is_empty() && !rel_types.contains(&rel.rel_type.as_str()) {
                        continue;
                    }
                    let next_id = rel.other_node(tip_id).unwrap_or(rel.dst);
                    if path.contains(next_id) {
                        continue;
                    }
                    if let Some(next_node) = self.get_node(next_id)? {
                        let mut new_path = path.clone();
                        new_path.append(rel, next_node);
                        if current_depth + 1 >= min_depth {
                            results.push(new_path.clone());
                        }
                        if current_depth + 1 < max_depth {
                            next_queue.push(new_path);
                        }
                    }
                }
            }

            queue = next_queue;
            if queue.is_empty() { break; }
        }

        Ok(results)
    }

    // ========================================================================
    // Index
    // ========================================================================

    /// Create (or re-declare) a named index. Re-declaring with a different
    /// type is an error.
    fn create_index(&self, name: &str, index_type: IndexType) -> Result<()>;

    /// Type of an existing index.
    fn index_type(&self, name: &str) -> Option<IndexType>;

    /// Add an entry. The index is created as `Exact` if it does not exist.
    fn index_add(
        &self,
        index: &str,
        element: GraphElement,
        key: &str,
        value: IndexValue,
    ) -> Result<()>;

    /// Remove all entries of `element` under `key`.
    fn index_remove(&self, index: &str, element: GraphElement, key: &str) -> Result<()>;

    /// Remove every entry of `element` from every index.
    fn index_remove_element(&self, element: GraphElement) -> Result<()>;

    /// Exact lookup.
    fn index_get(&self, index: &str, key: &str, value: &Value) -> Result<Vec<GraphElement>>;

    /// Query one key of an index.
    fn index_query(&self, index: &str, key: &str, query: &IndexQuery) -> Result<Vec<GraphElement>>;

    // ========================================================================
    // Introspection
    // ========================================================================

    fn node_count(&self) -> Result<u64>;

    fn relationship_count(&self) -> Result<u64>;
}
