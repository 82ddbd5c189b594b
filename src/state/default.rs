//! Attached entity state.

use std::sync::Arc;

use tracing::debug;

use crate::entity::{Entity, FieldValue};
use crate::fieldaccess::{FieldAccessor, TypeAccessors};
use crate::mapping::{EntityKind, FieldMeta};
use crate::model::{GraphElement, NodeId, PropertyMap, RelId, Value};
use crate::{Error, Result};

use super::EntityState;

/// Routes field access to the resolved accessors and notifies listeners
/// after every successful write.
///
/// Fields without an accessor are unmanaged: reads yield null and writes
/// return the value unchanged.
pub struct DefaultEntityState {
    accessors: Arc<TypeAccessors>,
}

impl DefaultEntityState {
    pub fn new(accessors: Arc<TypeAccessors>) -> Self {
        Self { accessors }
    }

    fn accessor(&self, field: &str) -> Option<&Arc<dyn FieldAccessor>> {
        self.accessors.accessor(field)
    }

    /// Existing element named by the in-memory id field, if any.
    fn reattach_target(&self, entity: &Entity) -> Result<Option<GraphElement>> {
        let Some(id_field) = entity.entity_type().id_field() else {
            return Ok(None);
        };
        let id = match entity.field_value(&id_field.name) {
            Some(FieldValue::Value(Value::Int(id))) => u64::try_from(id).map_err(|_| {
                Error::IllegalUsage(format!(
                    "{entity:?} has negative id {id} in field '{}'",
                    id_field.name
                ))
            })?,
            _ => return Ok(None),
        };
        let store = entity.context().store();
        let found = if entity.entity_type().is_relationship_entity() {
            store.get_relationship(RelId(id))?.map(|r| GraphElement::Relationship(r.id))
        } else {
            store.get_node(NodeId(id))?.map(|n| GraphElement::Node(n.id))
        };
        Ok(found)
    }

    fn create_node(&self, entity: &Entity) -> Result<GraphElement> {
        let ctx = entity.context();
        let type_name = entity.entity_type().name();
        let labels: Vec<&str> = if ctx.config().label_nodes { vec![type_name] } else { Vec::new() };
        let mut props = PropertyMap::new();
        props.insert(ctx.config().type_property.clone(), Value::from(type_name));
        let id = ctx.store().create_node(&labels, props)?;
        debug!(entity_type = %type_name, node = %id, "node created");
        Ok(GraphElement::Node(id))
    }

    fn create_relationship(&self, entity: &Entity, rel_type: &str) -> Result<GraphElement> {
        let ty = entity.entity_type();
        let start = endpoint(entity, ty.fields().iter().find(|f| f.annotations.start_node), "start")?;
        let end = endpoint(entity, ty.fields().iter().find(|f| f.annotations.end_node), "end")?;
        let ctx = entity.context();
        let mut props = PropertyMap::new();
        props.insert(ctx.config().type_property.clone(), Value::from(ty.name()));
        let id = ctx.store().create_relationship(start, end, rel_type, props)?;
        debug!(entity_type = %ty.name(), rel = %id, %start, %end, "relationship entity created");
        Ok(GraphElement::Relationship(id))
    }
}

/// Node behind the in-memory start or end field of a relationship entity,
/// persisting the node entity first if needed.
fn endpoint(entity: &Entity, field: Option<&FieldMeta>, which: &str) -> Result<NodeId> {
    let missing = || {
        Error::IllegalUsage(format!("{entity:?} needs a {which} node before it can be persisted"))
    };
    let field = field.ok_or_else(missing)?;
    let Some(FieldValue::Entity(node_entity)) = entity.field_value(&field.name) else {
        return Err(missing());
    };
    if !node_entity.has_persistent_state() {
        node_entity.persist()?;
    }
    node_entity.node_id().ok_or_else(missing)
}

impl EntityState for DefaultEntityState {
    fn is_writable(&self, entity: &Entity, field: &str) -> bool {
        self.accessor(field).is_none_or(|a| a.is_writeable(entity))
    }

    fn get_value(&mut self, entity: &Entity, field: &str) -> Result<FieldValue> {
        match self.accessor(field) {
            Some(accessor) => accessor.get_value(entity),
            None => Ok(FieldValue::Null),
        }
    }

    fn set_value(&mut self, entity: &Entity, field: &str, new_val: FieldValue) -> Result<FieldValue> {
        let Some(accessor) = self.accessor(field) else {
            return Ok(new_val);
        };
        let listeners = self.accessors.listeners(field);
        let old = if listeners.is_empty() { FieldValue::Null } else { accessor.get_value(entity)? };
        let result = accessor.set_value(entity, new_val)?;
        for listener in listeners {
            listener.value_changed(entity, &old, &result)?;
        }
        Ok(result)
    }

    fn check_value(&self, entity: &Entity, field: &str, new_val: &FieldValue) -> Result<()> {
        match self.accessor(field) {
            Some(accessor) => accessor.check_value(entity, new_val),
            None => Ok(()),
        }
    }

    fn create_and_assign_state(&mut self, entity: &Entity) -> Result<()> {
        if entity.has_persistent_state() {
            return Ok(());
        }
        let ctx = entity.context();
        if !ctx.transaction_is_running() {
            return Err(Error::ResourceUsage(format!(
                "cannot create backing state for {entity:?} outside of a transaction"
            )));
        }
        let element = match self.reattach_target(entity)? {
            Some(existing) => {
                debug!(entity_type = %entity.entity_type().name(), element = %existing, "reattached");
                existing
            }
            None => match entity.entity_type().kind() {
                EntityKind::Node => self.create_node(entity)?,
                EntityKind::Relationship { rel_type } => self.create_relationship(entity, rel_type)?,
            },
        };
        entity.assign_element(element)
    }

    fn persist(&mut self, entity: &Entity) -> Result<()> {
        self.create_and_assign_state(entity)
    }

    fn default_implementation(&self, field: &str) -> Option<FieldValue> {
        self.accessor(field).and_then(|a| a.default_implementation())
    }
}
