//! Per-type resolution of fields to accessors and listeners.

use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::config::OgmConfig;
use crate::convert::ConversionService;
use crate::mapping::EntityType;
use crate::storage::GraphStore;
use crate::{Error, Result};

use super::dynamic::DynamicPropertiesFieldAccessorFactory;
use super::id::{IdFieldAccessorFactory, TransientFieldAccessorFactory};
use super::indexing::IndexingPropertyFieldAccessorListenerFactory;
use super::property::{ConvertingPropertyFieldAccessorFactory, PropertyFieldAccessorFactory};
use super::relationship::{
    OneToNRelationshipFieldAccessorFactory, ReadOnlyOneToNRelationshipFieldAccessorFactory,
    SingleRelationshipFieldAccessorFactory,
};
use super::relationship_entity::{
    RelationshipEntitySetFieldAccessorFactory, RelationshipNodeFieldAccessorFactory,
};
use super::traversal::TraversalFieldAccessorFactory;
use super::{FieldAccessListener, FieldAccessor, FieldAccessorFactory, FieldAccessorListenerFactory};

type Listeners = SmallVec<[Arc<dyn FieldAccessListener>; 2]>;

// ============================================================================
// Resolution result
// ============================================================================

/// Accessor and listeners bound to one field.
pub struct FieldBinding {
    field: String,
    factory: Option<&'static str>,
    accessor: Option<Arc<dyn FieldAccessor>>,
    listeners: Listeners,
}

impl FieldBinding {
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Name of the factory that produced the accessor.
    pub fn factory(&self) -> Option<&'static str> {
        self.factory
    }

    pub fn accessor(&self) -> Option<&Arc<dyn FieldAccessor>> {
        self.accessor.as_ref()
    }

    pub fn listeners(&self) -> &[Arc<dyn FieldAccessListener>] {
        &self.listeners
    }

    /// Whether an accessor handles the field.
    pub fn is_managed(&self) -> bool {
        self.accessor.is_some()
    }
}

/// All bindings of one entity type, in field declaration order.
pub struct TypeAccessors {
    entity_type: Arc<EntityType>,
    bindings: Vec<FieldBinding>,
}

impl TypeAccessors {
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    pub fn bindings(&self) -> &[FieldBinding] {
        &self.bindings
    }

    pub fn binding(&self, field: &str) -> Option<&FieldBinding> {
        self.bindings.iter().find(|b| b.field == field)
    }

    pub fn accessor(&self, field: &str) -> Option<&Arc<dyn FieldAccessor>> {
        self.binding(field).and_then(FieldBinding::accessor)
    }

    pub fn listeners(&self, field: &str) -> &[Arc<dyn FieldAccessListener>] {
        self.binding(field).map(FieldBinding::listeners).unwrap_or(&[])
    }
}

// ============================================================================
// AccessorRegistry
// ============================================================================

/// Resolution of one registered type. The slot is only valid for the
/// exact `EntityType` instance it was created for.
struct Slot {
    entity_type: Arc<EntityType>,
    resolved: OnceLock<Result<Arc<TypeAccessors>>>,
}

impl Slot {
    fn new(entity_type: &Arc<EntityType>) -> Arc<Self> {
        Arc::new(Self { entity_type: Arc::clone(entity_type), resolved: OnceLock::new() })
    }

    fn is_for(&self, entity_type: &Arc<EntityType>) -> bool {
        Arc::ptr_eq(&self.entity_type, entity_type)
    }
}

/// Resolves every field of a type to the first accepting factory and caches
/// the result per type.
///
/// Concurrent first resolutions of the same type run the factories once;
/// other types are not blocked meanwhile. Failed resolutions are cached too
/// and replayed on every later request. Registering a new type under an
/// existing name starts a fresh resolution.
pub struct AccessorRegistry {
    factories: Vec<Box<dyn FieldAccessorFactory>>,
    listener_factories: Vec<Box<dyn FieldAccessorListenerFactory>>,
    cache: RwLock<HashMap<String, Arc<Slot>>>,
}

impl AccessorRegistry {
    pub fn new(
        store: Arc<dyn GraphStore>,
        conversion: Arc<dyn ConversionService>,
        config: &OgmConfig,
    ) -> Self {
        let factories: Vec<Box<dyn FieldAccessorFactory>> = vec![
            Box::new(IdFieldAccessorFactory),
            Box::new(RelationshipNodeFieldAccessorFactory),
            Box::new(TransientFieldAccessorFactory),
            Box::new(DynamicPropertiesFieldAccessorFactory),
            Box::new(PropertyFieldAccessorFactory::new(Arc::clone(&conversion))),
            Box::new(ConvertingPropertyFieldAccessorFactory::new(Arc::clone(&conversion))),
            Box::new(SingleRelationshipFieldAccessorFactory),
            Box::new(OneToNRelationshipFieldAccessorFactory),
            Box::new(ReadOnlyOneToNRelationshipFieldAccessorFactory),
            Box::new(TraversalFieldAccessorFactory::new(config.max_traversal_depth)),
            Box::new(RelationshipEntitySetFieldAccessorFactory),
        ];
        let listener_factories: Vec<Box<dyn FieldAccessorListenerFactory>> = vec![Box::new(
            IndexingPropertyFieldAccessorListenerFactory::new(store, conversion, config),
        )];
        Self::with_factories(factories, listener_factories)
    }

    /// A registry with a custom factory chain, consulted in order.
    pub fn with_factories(
        factories: Vec<Box<dyn FieldAccessorFactory>>,
        listener_factories: Vec<Box<dyn FieldAccessorListenerFactory>>,
    ) -> Self {
        Self { factories, listener_factories, cache: RwLock::new(HashMap::new()) }
    }

    /// Resolved bindings of `entity_type`, computed on first request.
    pub fn accessors_for(&self, entity_type: &Arc<EntityType>) -> Result<Arc<TypeAccessors>> {
        let slot = self.slot(entity_type);
        slot.resolved.get_or_init(|| self.resolve(entity_type)).clone()
    }

    /// Number of types resolved so far, failed ones included.
    pub fn resolved_types(&self) -> usize {
        self.cache.read().values().filter(|slot| slot.resolved.get().is_some()).count()
    }

    fn slot(&self, entity_type: &Arc<EntityType>) -> Arc<Slot> {
        if let Some(slot) = self.cache.read().get(entity_type.name()) {
            if slot.is_for(entity_type) {
                return Arc::clone(slot);
            }
        }
        let mut cache = self.cache.write();
        let slot = cache
            .entry(entity_type.name().to_string())
            .or_insert_with(|| Slot::new(entity_type));
        if !slot.is_for(entity_type) {
            debug!(entity_type = %entity_type.name(), "type replaced, resolving again");
            *slot = Slot::new(entity_type);
        }
        Arc::clone(slot)
    }

    fn resolve(&self, entity_type: &Arc<EntityType>) -> Result<Arc<TypeAccessors>> {
        validate(entity_type)?;
        let mut bindings = Vec::with_capacity(entity_type.fields().len());
        for field in entity_type.fields() {
            let factory = self.factories.iter().find(|f| f.accept(entity_type, field));
            let Some(factory) = factory else {
                info!(
                    entity_type = %entity_type.name(),
                    field = %field.name,
                    field_type = %field.field_type.describe(),
                    "no accessor accepts field, leaving it unmanaged"
                );
                bindings.push(FieldBinding {
                    field: field.name.clone(),
                    factory: None,
                    accessor: None,
                    listeners: Listeners::new(),
                });
                continue;
            };

            let accessor = factory.for_field(entity_type, field)?;
            let mut listeners = Listeners::new();
            for listener_factory in &self.listener_factories {
                if listener_factory.accept(entity_type, field) {
                    listeners.push(listener_factory.for_field(entity_type, field)?);
                }
            }
            info!(
                entity_type = %entity_type.name(),
                field = %field.name,
                factory = factory.name(),
                listeners = listeners.len(),
                "field accessor bound"
            );
            bindings.push(FieldBinding {
                field: field.name.clone(),
                factory: Some(factory.name()),
                accessor: Some(accessor),
                listeners,
            });
        }
        Ok(Arc::new(TypeAccessors { entity_type: Arc::clone(entity_type), bindings }))
    }
}

/// Annotation combinations no factory chain can resolve.
fn validate(entity_type: &EntityType) -> Result<()> {
    let ids = entity_type.fields().iter().filter(|f| f.annotations.id).count();
    if ids > 1 {
        return Err(Error::Configuration(format!(
            "{} declares {ids} id fields",
            entity_type.name()
        )));
    }
    for field in entity_type.fields() {
        let a = &field.annotations;
        if a.related_to.is_some() && a.related_to_via.is_some() {
            return Err(Error::Configuration(format!(
                "field '{}' of {} is both related_to and related_to_via",
                field.name,
                entity_type.name()
            )));
        }
        if (a.start_node || a.end_node) && !entity_type.is_relationship_entity() {
            return Err(Error::Configuration(format!(
                "field '{}' of node entity {} cannot be a start or end node",
                field.name,
                entity_type.name()
            )));
        }
        if a.start_node && a.end_node {
            return Err(Error::Configuration(format!(
                "field '{}' of {} cannot be both start and end node",
                field.name,
                entity_type.name()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::DefaultConversionService;
    use crate::mapping::{FieldMeta, FieldType, ScalarKind, TraversalDescription};
    use crate::model::Direction;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;

    fn registry() -> AccessorRegistry {
        AccessorRegistry::new(
            Arc::new(MemoryStore::new()),
            Arc::new(DefaultConversionService::new()),
            &OgmConfig::default(),
        )
    }

    fn factories(accessors: &TypeAccessors) -> Vec<(&str, Option<&'static str>)> {
        accessors.bindings().iter().map(|b| (b.field(), b.factory())).collect()
    }

    #[test]
    fn test_chain_order() {
        let ty = Arc::new(
            EntityType::node("Person")
                .field(FieldMeta::new("id", FieldType::Boxed(ScalarKind::Int)).id())
                .field(FieldMeta::new("cache", FieldType::Boxed(ScalarKind::String)).transient())
                .field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String)))
                .field(FieldMeta::new("born", FieldType::Date))
                .field(FieldMeta::new("extra", FieldType::DynamicProperties))
                .field(FieldMeta::new("spouse", FieldType::Reference("Person".into())))
                .field(FieldMeta::new("friends", FieldType::ReferenceSet("Person".into())))
                .field(FieldMeta::new("fans", FieldType::ReferenceSet("Person".into())).read_only())
                .field(
                    FieldMeta::new("network", FieldType::ReferenceSet("Person".into()))
                        .traversal(TraversalDescription::new(Direction::Both).relationship("friends")),
                )
                .field(FieldMeta::new("roles", FieldType::RelationshipEntitySet("Role".into())))
                .field(FieldMeta::new("blob", FieldType::Unmapped("Blob".into()))),
        );
        let resolved = registry().accessors_for(&ty).unwrap();
        assert_eq!(
            factories(&resolved),
            vec![
                ("id", Some("id")),
                ("cache", Some("transient")),
                ("name", Some("property")),
                ("born", Some("converting-property")),
                ("extra", Some("dynamic-properties")),
                ("spouse", Some("single-relationship")),
                ("friends", Some("one-to-n-relationship")),
                ("fans", Some("read-only-one-to-n-relationship")),
                ("network", Some("traversal")),
                ("roles", Some("relationship-entity-set")),
                ("blob", None),
            ]
        );
    }

    #[test]
    fn test_resolution_is_cached() {
        let registry = registry();
        let ty = Arc::new(
            EntityType::node("Tag").field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String))),
        );
        let first = registry.accessors_for(&ty).unwrap();
        let second = registry.accessors_for(&ty).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.resolved_types(), 1);
    }

    #[test]
    fn test_replaced_type_is_resolved_again() {
        let registry = registry();
        let before = Arc::new(
            EntityType::node("Person").field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String))),
        );
        let old = registry.accessors_for(&before).unwrap();
        assert!(old.accessor("age").is_none());

        let after = Arc::new(
            EntityType::node("Person")
                .field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String)))
                .field(FieldMeta::new("age", FieldType::Primitive(ScalarKind::Int))),
        );
        let new = registry.accessors_for(&after).unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(Arc::ptr_eq(new.entity_type(), &after));
        assert_eq!(new.binding("age").and_then(|b| b.factory()), Some("property"));
        assert_eq!(registry.resolved_types(), 1);
    }

    #[test]
    fn test_concurrent_first_resolution_yields_one_instance() {
        let registry = Arc::new(registry());
        let ty = Arc::new(
            EntityType::node("Tag").field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String))),
        );
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let ty = Arc::clone(&ty);
                std::thread::spawn(move || registry.accessors_for(&ty).unwrap())
            })
            .collect();
        let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(resolved.iter().all(|r| Arc::ptr_eq(r, &resolved[0])));
    }

    #[test]
    fn test_conflicting_annotations_fail_resolution() {
        let registry = registry();
        let ty = Arc::new(
            EntityType::node("Person").field(
                FieldMeta::new("knows", FieldType::ReferenceSet("Person".into()))
                    .related_to("KNOWS", Direction::Outgoing)
                    .related_to_via("KNOWS", Direction::Outgoing),
            ),
        );
        assert!(matches!(registry.accessors_for(&ty), Err(Error::Configuration(_))));
        // Replayed from the cache.
        assert!(matches!(registry.accessors_for(&ty), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_start_node_on_node_entity_rejected() {
        let ty = Arc::new(
            EntityType::node("Person")
                .field(FieldMeta::new("from", FieldType::Reference("Person".into())).start_node()),
        );
        assert!(matches!(registry().accessors_for(&ty), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_indexed_field_gets_listener() {
        let ty = Arc::new(
            EntityType::node("Person")
                .field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String)).indexed())
                .field(FieldMeta::new("nick", FieldType::Boxed(ScalarKind::String))),
        );
        let resolved = registry().accessors_for(&ty).unwrap();
        assert_eq!(resolved.listeners("name").len(), 1);
        assert!(resolved.listeners("nick").is_empty());
    }
}
