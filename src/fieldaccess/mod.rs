//! # Field Access
//!
//! Every declared field of an entity type is bound to at most one
//! [`FieldAccessor`] and any number of [`FieldAccessListener`]s. The
//! [`AccessorRegistry`] performs the binding once per type by asking an
//! ordered chain of factories; the first factory that accepts a field wins.
//!
//! ## Accessors
//!
//! | Accessor | Module | Field shape |
//! |----------|--------|-------------|
//! | `IdFieldAccessor` | `id` | store-assigned identity |
//! | `RelationshipNodeFieldAccessor` | `relationship_entity` | start/end node of a relationship entity |
//! | `TransientFieldAccessor` | `id` | never persisted |
//! | `DynamicPropertiesFieldAccessor` | `dynamic` | free-form map |
//! | `PropertyFieldAccessor` | `property` | scalars and arrays |
//! | `ConvertingPropertyFieldAccessor` | `property` | dates, timestamps, enums |
//! | `SingleRelationshipFieldAccessor` | `relationship` | single reference |
//! | `OneToNRelationshipFieldAccessor` | `relationship` | set of references |
//! | `ReadOnlyOneToNRelationshipFieldAccessor` | `relationship` | read-only set of references |
//! | `TraversalFieldAccessor` | `traversal` | computed set from a traversal |
//! | `RelationshipEntitySetFieldAccessor` | `relationship_entity` | set of relationship entities |

pub mod dynamic;
pub mod id;
pub mod indexing;
pub mod managed;
pub mod property;
pub mod registry;
pub mod relationship;
pub mod relationship_entity;
pub mod traversal;

use std::sync::Arc;

use crate::entity::{Entity, FieldValue};
use crate::mapping::{EntityType, FieldMeta};
use crate::{Error, Result};

pub use managed::ManagedSet;
pub use registry::{AccessorRegistry, FieldBinding, TypeAccessors};

// ============================================================================
// Traits
// ============================================================================

/// Reads and writes one field of an entity against its backing element.
pub trait FieldAccessor: Send + Sync {
    fn get_value(&self, entity: &Entity) -> Result<FieldValue>;

    /// Write `new_val`. The returned value becomes the field's in-memory
    /// value and may differ from the argument (a managed set instead of a
    /// plain one, the real id instead of an override).
    fn set_value(&self, entity: &Entity, new_val: FieldValue) -> Result<FieldValue>;

    fn is_writeable(&self, entity: &Entity) -> bool;

    /// Contract checks of [`set_value`](Self::set_value) that need no
    /// backing element. Buffered writes run these before they are accepted.
    fn check_value(&self, _entity: &Entity, _new_val: &FieldValue) -> Result<()> {
        Ok(())
    }

    /// Value a fresh entity starts with, if the accessor has one.
    fn default_implementation(&self) -> Option<FieldValue> {
        None
    }
}

/// Produces the accessor for fields it accepts.
pub trait FieldAccessorFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn accept(&self, entity_type: &EntityType, field: &FieldMeta) -> bool;

    fn for_field(
        &self,
        entity_type: &Arc<EntityType>,
        field: &FieldMeta,
    ) -> Result<Arc<dyn FieldAccessor>>;
}

/// Notified after a successful write of the field it is registered for.
pub trait FieldAccessListener: Send + Sync {
    fn value_changed(&self, entity: &Entity, old: &FieldValue, new: &FieldValue) -> Result<()>;
}

/// Produces listeners for fields it accepts.
pub trait FieldAccessorListenerFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn accept(&self, entity_type: &EntityType, field: &FieldMeta) -> bool;

    fn for_field(
        &self,
        entity_type: &Arc<EntityType>,
        field: &FieldMeta,
    ) -> Result<Arc<dyn FieldAccessListener>>;
}

// ============================================================================
// Shared helpers
// ============================================================================

pub(crate) fn read_only(entity_type: &EntityType, field: &str) -> Error {
    Error::ReadOnlyField { entity_type: entity_type.name().to_string(), field: field.to_string() }
}

/// Backing element of an entity or a resource-usage error.
pub(crate) fn require_element(entity: &Entity, field: &str) -> Result<crate::model::GraphElement> {
    entity.element().ok_or_else(|| {
        Error::ResourceUsage(format!(
            "{entity:?} has no backing element, cannot access field '{field}'"
        ))
    })
}

/// Backing node of an entity or a resource-usage error.
pub(crate) fn require_node(entity: &Entity, field: &str) -> Result<crate::model::NodeId> {
    require_element(entity, field)?.as_node().ok_or_else(|| {
        Error::IllegalUsage(format!(
            "field '{field}' needs a node entity, {entity:?} is backed by a relationship"
        ))
    })
}
