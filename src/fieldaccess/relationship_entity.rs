//! Fields involving relationship entities: the set of relationship entities
//! attached to a node, and the start/end node of a relationship entity.

use std::sync::Arc;

use crate::entity::{Entity, EntitySet, FieldValue};
use crate::mapping::{EntityKind, EntityType, FieldMeta, FieldType};
use crate::model::{Direction, GraphElement};
use crate::{Error, Result};

use super::{read_only, require_element, require_node, FieldAccessor, FieldAccessorFactory};

// ============================================================================
// RelationshipEntitySetFieldAccessor
// ============================================================================

/// One relationship entity per relationship, so that the relationship's own
/// properties are visible. Populated through [`Entity::relate_to`], never by
/// assignment.
pub struct RelationshipEntitySetFieldAccessor {
    entity_type: Arc<EntityType>,
    field: String,
    /// Relationship type from `related_to_via`; the relationship entity
    /// type's own type otherwise.
    rel_type: Option<String>,
    direction: Direction,
    target_type: String,
}

impl RelationshipEntitySetFieldAccessor {
    fn rel_type(&self, entity: &Entity) -> Result<String> {
        if let Some(rel_type) = &self.rel_type {
            return Ok(rel_type.clone());
        }
        let target = entity.context().mapping().require(&self.target_type)?;
        match target.kind() {
            EntityKind::Relationship { rel_type } => Ok(rel_type.clone()),
            EntityKind::Node => Err(Error::Configuration(format!(
                "field '{}' expects relationship entities, but {} is a node entity",
                self.field, self.target_type
            ))),
        }
    }
}

impl FieldAccessor for RelationshipEntitySetFieldAccessor {
    fn get_value(&self, entity: &Entity) -> Result<FieldValue> {
        let node = require_node(entity, &self.field)?;
        let rel_type = self.rel_type(entity)?;
        let ctx = entity.context();
        let set = ctx
            .store()
            .get_relationships(node, self.direction, Some(&rel_type))?
            .into_iter()
            .map(|rel| ctx.entity_for_element(GraphElement::Relationship(rel.id), &self.target_type))
            .collect::<Result<EntitySet>>()?;
        Ok(FieldValue::Entities(set))
    }

    fn set_value(&self, _entity: &Entity, _new_val: FieldValue) -> Result<FieldValue> {
        Err(read_only(&self.entity_type, &self.field))
    }

    fn is_writeable(&self, _entity: &Entity) -> bool {
        false
    }

    fn check_value(&self, _entity: &Entity, _new_val: &FieldValue) -> Result<()> {
        Err(read_only(&self.entity_type, &self.field))
    }
}

pub struct RelationshipEntitySetFieldAccessorFactory;

impl FieldAccessorFactory for RelationshipEntitySetFieldAccessorFactory {
    fn name(&self) -> &'static str {
        "relationship-entity-set"
    }

    fn accept(&self, _entity_type: &EntityType, field: &FieldMeta) -> bool {
        matches!(field.field_type, FieldType::RelationshipEntitySet(_))
    }

    fn for_field(&self, entity_type: &Arc<EntityType>, field: &FieldMeta) -> Result<Arc<dyn FieldAccessor>> {
        let via = field.annotations.related_to_via.as_ref();
        Ok(Arc::new(RelationshipEntitySetFieldAccessor {
            entity_type: Arc::clone(entity_type),
            field: field.name.clone(),
            rel_type: via.map(|r| r.rel_type.clone()),
            direction: via.map(|r| r.direction).unwrap_or_default(),
            target_type: field.field_type.target_type().unwrap_or_default().to_string(),
        }))
    }
}

// ============================================================================
// RelationshipNodeFieldAccessor
// ============================================================================

/// Start or end node of a relationship entity. Before the relationship
/// exists the field is an ordinary in-memory value used to create it.
pub struct RelationshipNodeFieldAccessor {
    entity_type: Arc<EntityType>,
    field: String,
    start: bool,
    node_type: String,
}

impl FieldAccessor for RelationshipNodeFieldAccessor {
    fn get_value(&self, entity: &Entity) -> Result<FieldValue> {
        let Some(element) = entity.element() else {
            return Ok(entity.field_value(&self.field).unwrap_or(FieldValue::Null));
        };
        let rel_id = element.as_relationship().ok_or_else(|| {
            Error::IllegalUsage(format!("{entity:?} is not backed by a relationship"))
        })?;
        let ctx = entity.context();
        let rel = ctx
            .store()
            .get_relationship(rel_id)?
            .ok_or_else(|| Error::NotFound(format!("Relationship {rel_id}")))?;
        let node = if self.start { rel.src } else { rel.dst };
        Ok(FieldValue::Entity(ctx.entity_for_element(GraphElement::Node(node), &self.node_type)?))
    }

    fn set_value(&self, entity: &Entity, new_val: FieldValue) -> Result<FieldValue> {
        if !entity.has_persistent_state() {
            self.check_value(entity, &new_val)?;
            return Ok(new_val);
        }
        require_element(entity, &self.field)?;
        let current = self.get_value(entity)?;
        if current.same_as(&new_val) {
            Ok(current)
        } else {
            Err(read_only(&self.entity_type, &self.field))
        }
    }

    fn is_writeable(&self, entity: &Entity) -> bool {
        !entity.has_persistent_state()
    }

    /// Unbound: the value must be a node entity of the declared type.
    /// Bound: the ends are fixed, only the current node is accepted.
    fn check_value(&self, entity: &Entity, new_val: &FieldValue) -> Result<()> {
        if entity.has_persistent_state() {
            let current = self.get_value(entity)?;
            if current.same_as(new_val) {
                return Ok(());
            }
            return Err(read_only(&self.entity_type, &self.field));
        }
        match new_val {
            v if v.is_null() => Ok(()),
            FieldValue::Entity(node) if node.entity_type().name() == self.node_type => Ok(()),
            other => Err(Error::TypeMismatch {
                expected: self.node_type.clone(),
                got: other.describe(),
            }),
        }
    }
}

pub struct RelationshipNodeFieldAccessorFactory;

impl FieldAccessorFactory for RelationshipNodeFieldAccessorFactory {
    fn name(&self) -> &'static str {
        "relationship-node"
    }

    fn accept(&self, entity_type: &EntityType, field: &FieldMeta) -> bool {
        entity_type.is_relationship_entity()
            && (field.annotations.start_node || field.annotations.end_node)
    }

    fn for_field(&self, entity_type: &Arc<EntityType>, field: &FieldMeta) -> Result<Arc<dyn FieldAccessor>> {
        let node_type = field.field_type.target_type().ok_or_else(|| {
            Error::Configuration(format!(
                "start/end node field '{}' of {} must be a reference",
                field.name,
                entity_type.name()
            ))
        })?;
        Ok(Arc::new(RelationshipNodeFieldAccessor {
            entity_type: Arc::clone(entity_type),
            field: field.name.clone(),
            start: field.annotations.start_node,
            node_type: node_type.to_string(),
        }))
    }
}
