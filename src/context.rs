//! # Mapping Context
//!
//! [`OgmContext`] ties one graph store to the mapping metadata and hands out
//! entities. It owns:
//!
//! - the store and the mapping configuration,
//! - the registry of entity types and the per-type accessor cache,
//! - the identity map that keeps one live entity instance per graph
//!   element, so cyclic object graphs materialize without recursion.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::OgmConfig;
use crate::convert::{ConversionService, DefaultConversionService};
use crate::entity::{Entity, EntityInner};
use crate::fieldaccess::{AccessorRegistry, TypeAccessors};
use crate::index::IndexQuery;
use crate::mapping::{EntityKind, EntityType, MappingContext};
use crate::model::{GraphElement, NodeId, PropertyMap, RelId, Value};
use crate::state::{DefaultEntityState, DetachedEntityState};
use crate::storage::{GraphStore, MemoryStore};
use crate::tx::{Transaction, TxMode};
use crate::{Error, Result};

/// Dead identity map entries are pruned once every this many inserts.
const IDENTITY_PRUNE_INTERVAL: usize = 1024;

/// Live entity instance per graph element.
#[derive(Default)]
struct IdentityMap {
    entries: HashMap<GraphElement, Weak<EntityInner>>,
    inserts: usize,
}

impl IdentityMap {
    fn get(&self, element: &GraphElement) -> Option<Entity> {
        self.entries.get(element).and_then(Entity::upgrade)
    }

    fn insert(&mut self, element: GraphElement, entity: Weak<EntityInner>) {
        self.inserts = self.inserts.wrapping_add(1);
        if self.inserts % IDENTITY_PRUNE_INTERVAL == 0 {
            self.entries.retain(|_, weak| weak.strong_count() > 0);
        }
        self.entries.insert(element, entity);
    }

    fn remove(&mut self, element: &GraphElement) {
        self.entries.remove(element);
    }
}

/// Shared entry point of the mapping layer. Always used through an `Arc`.
pub struct OgmContext {
    store: Arc<dyn GraphStore>,
    config: OgmConfig,
    mapping: MappingContext,
    registry: AccessorRegistry,
    conversion: Arc<dyn ConversionService>,
    identity: Mutex<IdentityMap>,
}

impl OgmContext {
    pub fn new(store: Arc<dyn GraphStore>, config: OgmConfig) -> Arc<Self> {
        Self::with_conversion(store, config, Arc::new(DefaultConversionService::new()))
    }

    pub fn with_conversion(
        store: Arc<dyn GraphStore>,
        config: OgmConfig,
        conversion: Arc<dyn ConversionService>,
    ) -> Arc<Self> {
        let registry = AccessorRegistry::new(Arc::clone(&store), Arc::clone(&conversion), &config);
        Arc::new(Self {
            store,
            config,
            mapping: MappingContext::new(),
            registry,
            conversion,
            identity: Mutex::new(IdentityMap::default()),
        })
    }

    /// A context over a fresh [`MemoryStore`] with default configuration.
    pub fn in_memory() -> Arc<Self> {
        Self::new(Arc::new(MemoryStore::new()), OgmConfig::default())
    }

    pub fn builder() -> OgmContextBuilder {
        OgmContextBuilder::default()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn config(&self) -> &OgmConfig {
        &self.config
    }

    pub fn mapping(&self) -> &MappingContext {
        &self.mapping
    }

    pub fn registry(&self) -> &AccessorRegistry {
        &self.registry
    }

    pub fn conversion(&self) -> &Arc<dyn ConversionService> {
        &self.conversion
    }

    /// Register an entity type. Register every type before its first use.
    pub fn register(&self, entity_type: EntityType) -> Arc<EntityType> {
        self.mapping.register(entity_type)
    }

    pub fn entity_type(&self, name: &str) -> Option<Arc<EntityType>> {
        self.mapping.get(name)
    }

    pub fn accessors_for(&self, entity_type: &Arc<EntityType>) -> Result<Arc<TypeAccessors>> {
        self.registry.accessors_for(entity_type)
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a read-write transaction, joining a running one.
    pub fn begin_tx(&self) -> Result<Transaction> {
        Transaction::begin(Arc::clone(&self.store), TxMode::ReadWrite)
    }

    pub fn transaction_is_running(&self) -> bool {
        self.store.is_transaction_running()
    }

    // ========================================================================
    // Entity lifecycle
    // ========================================================================

    /// A new entity of `entity_type`. Node entities get their backing node
    /// right away when a transaction is running; otherwise they stay unbound
    /// until persisted.
    pub fn new_entity(self: &Arc<Self>, entity_type: &Arc<EntityType>) -> Result<Entity> {
        let entity = self.instantiate(entity_type)?;
        if !entity_type.is_relationship_entity() {
            if self.transaction_is_running() {
                entity.create_and_assign_state()?;
            } else {
                debug!(entity_type = %entity_type.name(), "entity created outside of a transaction");
            }
        }
        Ok(entity)
    }

    fn instantiate(self: &Arc<Self>, entity_type: &Arc<EntityType>) -> Result<Entity> {
        let accessors = self.registry.accessors_for(entity_type)?;
        let state = DetachedEntityState::new(DefaultEntityState::new(Arc::clone(&accessors)));
        let entity = Entity::new(Arc::clone(self), Arc::clone(entity_type), Box::new(state));
        for binding in accessors.bindings() {
            if let Some(default) = binding.accessor().and_then(|a| a.default_implementation()) {
                entity.store_field_value(binding.field(), default);
            }
        }
        Ok(entity)
    }

    /// Persist `entity` inside its own transaction, joining a running one.
    pub fn save(&self, entity: &Entity) -> Result<Entity> {
        let tx = self.begin_tx()?;
        let saved = entity.persist()?;
        tx.commit()?;
        Ok(saved)
    }

    /// Delete the backing element of `entity` with its relationships and
    /// index entries. The entity ends up removed either way.
    pub(crate) fn remove(&self, entity: &Entity) -> Result<()> {
        if let Some(element) = entity.element() {
            let tx = self.begin_tx()?;
            self.store.index_remove_element(element)?;
            match element {
                GraphElement::Node(id) => {
                    self.store.detach_delete_node(id)?;
                }
                GraphElement::Relationship(id) => {
                    self.store.delete_relationship(id)?;
                }
            }
            tx.commit()?;
            self.identity.lock().remove(&element);
            debug!(%element, "entity removed");
        }
        entity.mark_removed();
        Ok(())
    }

    /// Create a relationship entity of `relationship_type` from `source` to
    /// `target`, persisting either node entity if needed.
    pub(crate) fn relate(
        self: &Arc<Self>,
        source: &Entity,
        target: &Entity,
        relationship_type: &Arc<EntityType>,
    ) -> Result<Entity> {
        let EntityKind::Relationship { rel_type } = relationship_type.kind() else {
            return Err(Error::IllegalUsage(format!(
                "{} is not a relationship entity type",
                relationship_type.name()
            )));
        };
        let tx = self.begin_tx()?;
        let src = persisted_node(source)?;
        let dst = persisted_node(target)?;
        let mut props = PropertyMap::new();
        props.insert(self.config.type_property.clone(), Value::from(relationship_type.name()));
        let rel = self.store.create_relationship(src, dst, rel_type, props)?;
        let entity = self.attach(GraphElement::Relationship(rel), relationship_type)?;
        tx.commit()?;
        debug!(rel_type = %rel_type, %src, %dst, "entities related");
        Ok(entity)
    }

    // ========================================================================
    // Materialization
    // ========================================================================

    /// The entity backed by `element`: the live instance if there is one,
    /// otherwise a new attached entity of the type named by the element's
    /// type property, falling back to `declared_type`.
    pub fn entity_for_element(self: &Arc<Self>, element: GraphElement, declared_type: &str) -> Result<Entity> {
        if let Some(existing) = self.cached_instance(element) {
            return Ok(existing);
        }
        let alias = match self.store.get_property_opt(element, &self.config.type_property)? {
            Some(Value::String(alias)) => self.mapping.get(&alias),
            _ => None,
        };
        let entity_type = match alias {
            Some(ty) => ty,
            None => self.mapping.require(declared_type)?,
        };
        self.attach(element, &entity_type)
    }

    fn attach(self: &Arc<Self>, element: GraphElement, entity_type: &Arc<EntityType>) -> Result<Entity> {
        let entity = self.instantiate(entity_type)?;
        entity.assign_element(element)?;
        Ok(entity)
    }

    fn cached_instance(&self, element: GraphElement) -> Option<Entity> {
        self.identity.lock().get(&element)
    }

    pub(crate) fn register_instance(&self, element: GraphElement, entity: &Entity) {
        self.identity.lock().insert(element, entity.downgrade());
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Entity of `entity_type` with store identity `id`, if the element exists.
    pub fn find(self: &Arc<Self>, entity_type: &Arc<EntityType>, id: u64) -> Result<Option<Entity>> {
        let element = if entity_type.is_relationship_entity() {
            self.store.get_relationship(RelId(id))?.map(|r| GraphElement::Relationship(r.id))
        } else {
            self.store.get_node(NodeId(id))?.map(|n| GraphElement::Node(n.id))
        };
        element
            .map(|e| self.entity_for_element(e, entity_type.name()))
            .transpose()
    }

    /// Entities whose indexed `field` currently equals `value`.
    pub fn find_by_index(
        self: &Arc<Self>,
        entity_type: &Arc<EntityType>,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<Entity>> {
        let meta = entity_type.get_field(field).ok_or_else(|| {
            Error::IllegalUsage(format!("{} has no field '{field}'", entity_type.name()))
        })?;
        let indexed = meta.annotations.indexed.is_some()
            || entity_type.is_indexed()
            || self.config.index_all_properties;
        if !indexed || !meta.field_type.is_property_like() {
            return Err(Error::IllegalUsage(format!(
                "field '{field}' of {} is not indexed",
                entity_type.name()
            )));
        }
        let index = meta
            .annotations
            .indexed
            .as_ref()
            .and_then(|i| i.index_name.clone())
            .unwrap_or_else(|| entity_type.default_index_name().to_string());
        let mut value = value.into();
        if self.conversion.can_convert(&meta.field_type) {
            value = self.conversion.to_store(&value, &meta.field_type)?;
        }
        let key = entity_type.property_name(field);
        self.store
            .index_get(&index, &key, &value)?
            .into_iter()
            .map(|e| self.entity_for_element(e, entity_type.name()))
            .collect()
    }

    /// Entities matching `query` against `key` of `index`.
    pub fn query_index(
        self: &Arc<Self>,
        index: &str,
        key: &str,
        query: &IndexQuery,
        entity_type: &Arc<EntityType>,
    ) -> Result<Vec<Entity>> {
        self.store
            .index_query(index, key, query)?
            .into_iter()
            .map(|e| self.entity_for_element(e, entity_type.name()))
            .collect()
    }
}

fn persisted_node(entity: &Entity) -> Result<NodeId> {
    if !entity.has_persistent_state() {
        entity.persist()?;
    }
    entity.node_id().ok_or_else(|| {
        Error::IllegalUsage(format!("{entity:?} is not a node entity"))
    })
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for an [`OgmContext`] with a custom store, configuration or
/// conversion service.
#[derive(Default)]
pub struct OgmContextBuilder {
    store: Option<Arc<dyn GraphStore>>,
    config: OgmConfig,
    conversion: Option<Arc<dyn ConversionService>>,
}

impl OgmContextBuilder {
    pub fn store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: OgmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn conversion(mut self, conversion: Arc<dyn ConversionService>) -> Self {
        self.conversion = Some(conversion);
        self
    }

    pub fn build(self) -> Result<Arc<OgmContext>> {
        self.config.validate()?;
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let conversion = self
            .conversion
            .unwrap_or_else(|| Arc::new(DefaultConversionService::new()));
        Ok(OgmContext::with_conversion(store, self.config, conversion))
    }
}
