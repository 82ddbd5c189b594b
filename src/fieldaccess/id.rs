//! Identity and transient field accessors.

use std::sync::Arc;

use crate::entity::{Entity, FieldValue};
use crate::mapping::{EntityType, FieldMeta};
use crate::model::{GraphElement, Value};
use crate::{Error, Result};

use super::{require_element, FieldAccessor, FieldAccessorFactory};

/// Exposes the store-assigned identity of the backing element. Writes never
/// change it.
pub struct IdFieldAccessor {
    field: String,
}

impl IdFieldAccessor {
    fn id_value(&self, element: GraphElement) -> Result<FieldValue> {
        let id = i64::try_from(element.id()).map_err(|_| {
            Error::IllegalUsage(format!(
                "{element} does not fit the integer id field '{}'",
                self.field
            ))
        })?;
        Ok(FieldValue::Value(Value::Int(id)))
    }
}

impl FieldAccessor for IdFieldAccessor {
    fn get_value(&self, entity: &Entity) -> Result<FieldValue> {
        self.id_value(require_element(entity, &self.field)?)
    }

    /// Before attachment the value is kept in memory so it can be used to
    /// reattach; afterwards the real identity is returned instead.
    fn set_value(&self, entity: &Entity, new_val: FieldValue) -> Result<FieldValue> {
        match entity.element() {
            Some(element) => self.id_value(element),
            None => Ok(new_val),
        }
    }

    fn is_writeable(&self, _entity: &Entity) -> bool {
        false
    }
}

pub struct IdFieldAccessorFactory;

impl FieldAccessorFactory for IdFieldAccessorFactory {
    fn name(&self) -> &'static str {
        "id"
    }

    fn accept(&self, _entity_type: &EntityType, field: &FieldMeta) -> bool {
        field.annotations.id
    }

    fn for_field(&self, _entity_type: &Arc<EntityType>, field: &FieldMeta) -> Result<Arc<dyn FieldAccessor>> {
        Ok(Arc::new(IdFieldAccessor { field: field.name.clone() }))
    }
}

/// A field that lives only in memory.
pub struct TransientFieldAccessor {
    field: String,
}

impl FieldAccessor for TransientFieldAccessor {
    fn get_value(&self, entity: &Entity) -> Result<FieldValue> {
        Ok(entity.field_value(&self.field).unwrap_or(FieldValue::Null))
    }

    fn set_value(&self, _entity: &Entity, new_val: FieldValue) -> Result<FieldValue> {
        Ok(new_val)
    }

    fn is_writeable(&self, _entity: &Entity) -> bool {
        false
    }
}

pub struct TransientFieldAccessorFactory;

impl FieldAccessorFactory for TransientFieldAccessorFactory {
    fn name(&self) -> &'static str {
        "transient"
    }

    fn accept(&self, _entity_type: &EntityType, field: &FieldMeta) -> bool {
        field.annotations.transient
    }

    fn for_field(&self, _entity_type: &Arc<EntityType>, field: &FieldMeta) -> Result<Arc<dyn FieldAccessor>> {
        Ok(Arc::new(TransientFieldAccessor { field: field.name.clone() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OgmContext;
    use crate::mapping::{FieldType, ScalarKind};

    #[test]
    fn test_id_override_is_ignored_once_attached() {
        let ctx = OgmContext::in_memory();
        let ty = ctx.register(
            EntityType::node("Thing")
                .field(FieldMeta::new("id", FieldType::Boxed(ScalarKind::Int)).id())
                .field(FieldMeta::new("scratch", FieldType::Boxed(ScalarKind::String)).transient()),
        );
        let tx = ctx.begin_tx().unwrap();
        let thing = ctx.new_entity(&ty).unwrap();
        let real = thing.element().unwrap().id() as i64;

        let returned = thing.set("id", 9_999).unwrap();
        assert_eq!(returned.as_int(), Some(real));
        assert_eq!(thing.get("id").unwrap().as_int(), Some(real));
        assert!(!thing.is_writable("id"));

        thing.set("scratch", "memo").unwrap();
        assert_eq!(thing.get("scratch").unwrap().as_str(), Some("memo"));
        assert!(!ctx.store().has_property(thing.element().unwrap(), "scratch").unwrap());
        tx.commit().unwrap();
    }

    #[test]
    fn test_negative_id_cannot_reattach() {
        let ctx = OgmContext::in_memory();
        let ty = ctx.register(
            EntityType::node("Thing").field(FieldMeta::new("id", FieldType::Boxed(ScalarKind::Int)).id()),
        );
        let thing = ctx.new_entity(&ty).unwrap();
        thing.set("id", -5).unwrap();
        assert!(matches!(ctx.save(&thing), Err(crate::Error::IllegalUsage(_))));
        assert!(!thing.has_persistent_state());
        assert_eq!(ctx.store().node_count().unwrap(), 0);
    }
}
