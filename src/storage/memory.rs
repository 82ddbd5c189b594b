//! In-memory graph store.
//!
//! This is the reference implementation of `GraphStore`.
//! All graph data lives behind one `RwLock`; transactions are tracked
//! separately.
//!
//! ## Transactions
//!
//! - One transaction at a time per store. `begin_tx()` while a transaction
//!   is running joins it (nested placebo transaction).
//! - The outermost `begin_tx()` snapshots the graph data; rolling back
//!   restores the snapshot. A nested rollback marks the outer transaction
//!   rollback-only and the outer commit then fails.
//! - Writes outside a transaction fail with `Error::NotInTransaction`.
//!   Reads never need one.
//!
//! Use this store for:
//! - Testing entity mapping without an external database
//! - Embedding the mapping layer in applications that don't need persistence

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::index::{tokenize, IndexQuery, IndexType, IndexValue};
use crate::model::*;
use crate::tx::{TxId, TxMode};
use crate::{Error, Result};
use super::GraphStore;

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory property graph storage.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    data: RwLock<GraphData>,
    tx: Mutex<TxState>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
}

#[derive(Clone, Default)]
struct GraphData {
    nodes: HashMap<NodeId, Node>,
    relationships: HashMap<RelId, Relationship>,
    /// node_id → list of relationship IDs
    adjacency: HashMap<NodeId, Vec<RelId>>,
    indexes: HashMap<String, MemoryIndex>,
}

#[derive(Clone, Default)]
struct MemoryIndex {
    index_type: IndexType,
    /// key → (element, value) entries
    entries: HashMap<String, Vec<(GraphElement, IndexValue)>>,
}

#[derive(Default)]
struct TxState {
    /// Open transaction ids, outermost first.
    stack: Vec<TxId>,
    mode: Option<TxMode>,
    rollback_only: bool,
    snapshot: Option<GraphData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                data: RwLock::new(GraphData::default()),
                tx: Mutex::new(TxState::default()),
                next_node_id: AtomicU64::new(1),
                next_rel_id: AtomicU64::new(1),
                next_tx_id: AtomicU64::new(1),
            }),
        }
    }

    fn require_write_tx(&self) -> Result<()> {
        let tx = self.inner.tx.lock();
        match tx.mode {
            None => Err(Error::NotInTransaction),
            Some(TxMode::ReadOnly) => Err(Error::TxError(
                "write attempted in a read-only transaction".into(),
            )),
            Some(TxMode::ReadWrite) => Ok(()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphData {
    fn properties(&self, element: GraphElement) -> Result<&PropertyMap> {
        match element {
            GraphElement::Node(id) => self
                .nodes
                .get(&id)
                .map(|n| &n.properties)
                .ok_or_else(|| Error::NotFound(format!("Node {id}"))),
            GraphElement::Relationship(id) => self
                .relationships
                .get(&id)
                .map(|r| &r.properties)
                .ok_or_else(|| Error::NotFound(format!("Relationship {id}"))),
        }
    }

    fn properties_mut(&mut self, element: GraphElement) -> Result<&mut PropertyMap> {
        match element {
            GraphElement::Node(id) => self
                .nodes
                .get_mut(&id)
                .map(|n| &mut n.properties)
                .ok_or_else(|| Error::NotFound(format!("Node {id}"))),
            GraphElement::Relationship(id) => self
                .relationships
                .get_mut(&id)
                .map(|r| &mut r.properties)
                .ok_or_else(|| Error::NotFound(format!("Relationship {id}"))),
        }
    }
}

// ============================================================================
// GraphStore impl
// ============================================================================

impl GraphStore for MemoryStore {
    // ========================================================================
    // Transactions
    // ========================================================================

    fn begin_tx(&self, mode: TxMode) -> Result<TxId> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        let mut tx = self.inner.tx.lock();
        if tx.stack.is_empty() {
            tx.mode = Some(mode);
            tx.rollback_only = false;
            tx.snapshot = Some(self.inner.data.read().clone());
        }
        tx.stack.push(id);
        Ok(id)
    }

    fn commit_tx(&self, id: TxId) -> Result<()> {
        let mut tx = self.inner.tx.lock();
        if tx.stack.last() != Some(&id) {
            return Err(Error::TxError(format!("transaction {id} is not the innermost running transaction")));
        }
        tx.stack.pop();
        if !tx.stack.is_empty() {
            return Ok(());
        }
        tx.mode = None;
        let snapshot = tx.snapshot.take();
        if tx.rollback_only {
            tx.rollback_only = false;
            if let Some(snapshot) = snapshot {
                *self.inner.data.write() = snapshot;
            }
            return Err(Error::TxError(format!(
                "transaction {id} was marked rollback-only and has been rolled back"
            )));
        }
        Ok(())
    }

    fn rollback_tx(&self, id: TxId) -> Result<()> {
        let mut tx = self.inner.tx.lock();
        if tx.stack.last() != Some(&id) {
            return Err(Error::TxError(format!("transaction {id} is not the innermost running transaction")));
        }
        tx.stack.pop();
        if !tx.stack.is_empty() {
            tx.rollback_only = true;
            return Ok(());
        }
        tx.mode = None;
        tx.rollback_only = false;
        if let Some(snapshot) = tx.snapshot.take() {
            *self.inner.data.write() = snapshot;
        }
        Ok(())
    }

    fn is_transaction_running(&self) -> bool {
        !self.inner.tx.lock().stack.is_empty()
    }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    fn create_node(&self, labels: &[&str], props: PropertyMap) -> Result<NodeId> {
        self.require_write_tx()?;
        let id = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
        let node = Node {
            id,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: props,
        };

        let mut data = self.inner.data.write();
        data.nodes.insert(id, node);
        data.adjacency.insert(id, Vec::new());
        Ok(id)
    }

    fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.inner.data.read().nodes.get(&id).cloned())
    }

    fn delete_node(&self, id: NodeId) -> Result<bool> {
        self.require_write_tx()?;
        let mut data = self.inner.data.write();
        if let Some(rels) = data.adjacency.get(&id) {
            if !rels.is_empty() {
                return Err(Error::ConstraintViolation(format!(
                    "Cannot delete node {id} with {} relationships. Delete relationships first.",
                    rels.len()
                )));
            }
        }
        data.adjacency.remove(&id);
        Ok(data.nodes.remove(&id).is_some())
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    fn create_relationship(
        &self,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        self.require_write_tx()?;
        let mut data = self.inner.data.write();
        if !data.nodes.contains_key(&src) {
            return Err(Error::NotFound(format!("Source node {src}")));
        }
        if !data.nodes.contains_key(&dst) {
            return Err(Error::NotFound(format!("Target node {dst}")));
        }

        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed));
        let rel = Relationship {
            id,
            src,
            dst,
            rel_type: rel_type.to_string(),
            properties: props,
        };
        data.relationships.insert(id, rel);

        // Update adjacency for both endpoints
        data.adjacency.entry(src).or_default().push(id);
        if src != dst {
            data.adjacency.entry(dst).or_default().push(id);
        }
        Ok(id)
    }

    fn get_relationship(&self, id: RelId) -> Result<Option<Relationship>> {
        Ok(self.inner.data.read().relationships.get(&id).cloned())
    }

    fn delete_relationship(&self, id: RelId) -> Result<bool> {
        self.require_write_tx()?;
        let mut data = self.inner.data.write();
        let removed = data.relationships.remove(&id);
        if let Some(rel) = &removed {
            if let Some(rels) = data.adjacency.get_mut(&rel.src) {
                rels.retain(|rid| *rid != id);
            }
            if rel.src != rel.dst {
                if let Some(rels) = data.adjacency.get_mut(&rel.dst) {
                    rels.retain(|rid| *rid != id);
                }
            }
        }
        Ok(removed.is_some())
    }

    // ========================================================================
    // Element properties
    // ========================================================================

    fn has_property(&self, element: GraphElement, key: &str) -> Result<bool> {
        Ok(self.inner.data.read().properties(element)?.contains_key(key))
    }

    fn get_property(&self, element: GraphElement, key: &str) -> Result<Value> {
        self.inner
            .data
            .read()
            .properties(element)?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("property '{key}' on {element}")))
    }

    fn set_property(&self, element: GraphElement, key: &str, val: Value) -> Result<()> {
        self.require_write_tx()?;
        self.inner.data.write().properties_mut(element)?.insert(key.to_string(), val);
        Ok(())
    }

    fn remove_property(&self, element: GraphElement, key: &str) -> Result<()> {
        self.require_write_tx()?;
        self.inner.data.write().properties_mut(element)?.remove(key);
        Ok(())
    }

    fn property_keys(&self, element: GraphElement) -> Result<Vec<String>> {
        let data = self.inner.data.read();
        let mut keys: Vec<String> = data.properties(element)?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    fn get_relationships(
        &self,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        let data = self.inner.data.read();
        let Some(rel_ids) = data.adjacency.get(&node) else {
            return Ok(Vec::new());
        };

        Ok(rel_ids
            .iter()
            .filter_map(|rid| data.relationships.get(rid))
            .filter(|rel| dir.matches(rel, node))
            .filter(|rel| rel_type.is_none_or(|t| rel.rel_type == t))
            .cloned()
            .collect())
    }

    // ========================================================================
    // Index
    // ========================================================================

    fn create_index(&self, name: &str, index_type: IndexType) -> Result<()> {
        let mut data = self.inner.data.write();
        match data.indexes.get(name) {
            Some(existing) if existing.index_type != index_type => Err(Error::Configuration(format!(
                "index '{name}' already exists as {:?}, cannot redeclare as {index_type:?}",
                existing.index_type
            ))),
            Some(_) => Ok(()),
            None => {
                data.indexes.insert(
                    name.to_string(),
                    MemoryIndex { index_type, entries: HashMap::new() },
                );
                Ok(())
            }
        }
    }

    fn index_type(&self, name: &str) -> Option<IndexType> {
        self.inner.data.read().indexes.get(name).map(|i| i.index_type)
    }

    fn index_add(
        &self,
        index: &str,
        element: GraphElement,
        key: &str,
        value: IndexValue,
    ) -> Result<()> {
        self.require_write_tx()?;
        let mut data = self.inner.data.write();
        let entries = data
            .indexes
            .entry(index.to_string())
            .or_default()
            .entries
            .entry(key.to_string())
            .or_default();
        if !entries.iter().any(|(e, v)| *e == element && *v == value) {
            entries.push((element, value));
        }
        Ok(())
    }

    fn index_remove(&self, index: &str, element: GraphElement, key: &str) -> Result<()> {
        self.require_write_tx()?;
        let mut data = self.inner.data.write();
        if let Some(entries) = data.indexes.get_mut(index).and_then(|i| i.entries.get_mut(key)) {
            entries.retain(|(e, _)| *e != element);
        }
        Ok(())
    }

    fn index_remove_element(&self, element: GraphElement) -> Result<()> {
        self.require_write_tx()?;
        let mut data = self.inner.data.write();
        for index in data.indexes.values_mut() {
            for entries in index.entries.values_mut() {
                entries.retain(|(e, _)| *e != element);
            }
        }
        Ok(())
    }

    fn index_get(&self, index: &str, key: &str, value: &Value) -> Result<Vec<GraphElement>> {
        self.index_query(index, key, &IndexQuery::Exact(value.clone()))
    }

    fn index_query(&self, index: &str, key: &str, query: &IndexQuery) -> Result<Vec<GraphElement>> {
        let data = self.inner.data.read();
        let Some(idx) = data.indexes.get(index) else {
            return Ok(Vec::new());
        };
        let Some(entries) = idx.entries.get(key) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<GraphElement> = Vec::new();
        for (element, value) in entries {
            let matched = match (query, value) {
                (IndexQuery::Exact(wanted), stored) => stored.matches(wanted),
                (IndexQuery::Range { min, max }, IndexValue::Numeric(n)) => {
                    min.is_none_or(|m| *n >= m) && max.is_none_or(|m| *n <= m)
                }
                (IndexQuery::Range { .. }, IndexValue::Exact(_)) => false,
                (IndexQuery::Term(term), IndexValue::Exact(Value::String(text))) => {
                    let term = term.to_lowercase();
                    tokenize(text).iter().any(|t| *t == term)
                }
                (IndexQuery::Term(_), _) => false,
            };
            if matched && !hits.contains(element) {
                hits.push(*element);
            }
        }
        Ok(hits)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    fn node_count(&self) -> Result<u64> {
        Ok(self.inner.data.read().nodes.len() as u64)
    }

    fn relationship_count(&self) -> Result<u64> {
        Ok(self.inner.data.read().relationships.len() as u64)
    }
}

// ============================================================================
// Tests
// ============================================================================
