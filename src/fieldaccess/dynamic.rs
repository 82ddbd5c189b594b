//! Free-form map fields stored as prefixed properties.

use std::sync::Arc;

use crate::entity::{Entity, FieldValue};
use crate::mapping::{EntityType, FieldMeta, FieldType};
use crate::model::PropertyMap;
use crate::{Error, Result};

use super::{require_element, FieldAccessor, FieldAccessorFactory};

/// Each map entry `key` of field `field` is stored as property
/// `"<field>-<key>"` on the backing element.
pub struct DynamicPropertiesFieldAccessor {
    field: String,
    prefix: String,
}

impl DynamicPropertiesFieldAccessor {
    fn prefixed(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl FieldAccessor for DynamicPropertiesFieldAccessor {
    fn get_value(&self, entity: &Entity) -> Result<FieldValue> {
        let element = require_element(entity, &self.field)?;
        let store = entity.context().store();
        let mut map = PropertyMap::new();
        for key in store.property_keys(element)? {
            if let Some(stripped) = key.strip_prefix(&self.prefix) {
                map.insert(stripped.to_string(), store.get_property(element, &key)?);
            }
        }
        Ok(FieldValue::Properties(map))
    }

    fn set_value(&self, entity: &Entity, new_val: FieldValue) -> Result<FieldValue> {
        self.check_value(entity, &new_val)?;
        let element = require_element(entity, &self.field)?;
        let map = match new_val {
            FieldValue::Properties(map) => map,
            _ => PropertyMap::new(),
        };
        let store = entity.context().store();
        for key in store.property_keys(element)? {
            let keep = key.strip_prefix(&self.prefix).is_some_and(|k| map.contains_key(k));
            if key.starts_with(&self.prefix) && !keep {
                store.remove_property(element, &key)?;
            }
        }
        for (key, value) in &map {
            if value.is_null() {
                store.remove_property(element, &self.prefixed(key))?;
            } else {
                store.set_property(element, &self.prefixed(key), value.clone())?;
            }
        }
        Ok(FieldValue::Properties(map))
    }

    fn is_writeable(&self, _entity: &Entity) -> bool {
        true
    }

    fn check_value(&self, _entity: &Entity, new_val: &FieldValue) -> Result<()> {
        match new_val {
            FieldValue::Properties(_) => Ok(()),
            v if v.is_null() => Ok(()),
            other => Err(Error::TypeMismatch {
                expected: "DynamicProperties".into(),
                got: other.describe(),
            }),
        }
    }

    fn default_implementation(&self) -> Option<FieldValue> {
        Some(FieldValue::Properties(PropertyMap::new()))
    }
}

pub struct DynamicPropertiesFieldAccessorFactory;

impl FieldAccessorFactory for DynamicPropertiesFieldAccessorFactory {
    fn name(&self) -> &'static str {
        "dynamic-properties"
    }

    fn accept(&self, _entity_type: &EntityType, field: &FieldMeta) -> bool {
        field.field_type == FieldType::DynamicProperties
    }

    fn for_field(&self, entity_type: &Arc<EntityType>, field: &FieldMeta) -> Result<Arc<dyn FieldAccessor>> {
        Ok(Arc::new(DynamicPropertiesFieldAccessor {
            field: field.name.clone(),
            prefix: format!("{}-", entity_type.property_name(&field.name)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OgmContext;
    use crate::model::{properties, Value};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_replace_drops_stale_keys() {
        let ctx = OgmContext::in_memory();
        let ty = ctx.register(
            EntityType::node("Doc").field(FieldMeta::new("meta", FieldType::DynamicProperties)),
        );
        let tx = ctx.begin_tx().unwrap();
        let doc = ctx.new_entity(&ty).unwrap();
        let element = doc.element().unwrap();

        doc.set("meta", properties([("a", Value::Int(1)), ("b", Value::from("x"))])).unwrap();
        let mut keys = ctx.store().property_keys(element).unwrap();
        keys.sort();
        assert_eq!(keys, vec!["__type__".to_string(), "meta-a".into(), "meta-b".into()]);

        doc.set("meta", properties([("b", Value::from("y"))])).unwrap();
        let read = doc.get("meta").unwrap();
        assert_eq!(read.as_properties(), Some(&properties([("b", Value::from("y"))])));
        assert!(!ctx.store().has_property(element, "meta-a").unwrap());
        tx.commit().unwrap();
    }
}
