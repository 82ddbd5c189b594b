//! Scalar property accessors.

use std::sync::Arc;

use crate::convert::ConversionService;
use crate::entity::{Entity, FieldValue};
use crate::mapping::{EntityType, FieldMeta, FieldType};
use crate::model::Value;
use crate::{Error, Result};

use super::{require_element, FieldAccessor, FieldAccessorFactory};

// ============================================================================
// PropertyFieldAccessor
// ============================================================================

/// Stores a scalar or array field in one property of the backing element.
/// Conversion is applied on read only, when the stored runtime type differs
/// from the declared type.
pub struct PropertyFieldAccessor {
    field: String,
    property: String,
    field_type: FieldType,
    conversion: Arc<dyn ConversionService>,
}

impl PropertyFieldAccessor {
    pub fn new(entity_type: &EntityType, field: &FieldMeta, conversion: Arc<dyn ConversionService>) -> Self {
        Self {
            field: field.name.clone(),
            property: entity_type.property_name(&field.name),
            field_type: field.field_type.clone(),
            conversion,
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    fn has_declared_type(&self, value: &Value) -> bool {
        match &self.field_type {
            FieldType::Primitive(kind) | FieldType::Boxed(kind) => kind.matches(value),
            FieldType::Array(kind) => value
                .as_list()
                .is_some_and(|items| items.iter().all(|item| kind.matches(item))),
            _ => false,
        }
    }
}

impl FieldAccessor for PropertyFieldAccessor {
    fn get_value(&self, entity: &Entity) -> Result<FieldValue> {
        let element = require_element(entity, &self.field)?;
        let stored = entity.context().store().get_property_opt(element, &self.property)?;
        let value = match stored {
            None => self.field_type.default_value(),
            Some(v) if self.has_declared_type(&v) => v,
            Some(v) => self.conversion.to_field(&v, &self.field_type)?,
        };
        Ok(FieldValue::from(value))
    }

    fn set_value(&self, entity: &Entity, new_val: FieldValue) -> Result<FieldValue> {
        self.check_value(entity, &new_val)?;
        let element = require_element(entity, &self.field)?;
        let store = entity.context().store();
        match &new_val {
            FieldValue::Value(v) if !v.is_null() => {
                store.set_property(element, &self.property, v.clone())?
            }
            _ => store.remove_property(element, &self.property)?,
        }
        Ok(new_val)
    }

    fn is_writeable(&self, _entity: &Entity) -> bool {
        true
    }

    fn check_value(&self, _entity: &Entity, new_val: &FieldValue) -> Result<()> {
        match new_val {
            v if v.is_null() => Ok(()),
            FieldValue::Value(_) => Ok(()),
            other => Err(Error::TypeMismatch {
                expected: self.field_type.describe(),
                got: other.describe(),
            }),
        }
    }
}

pub struct PropertyFieldAccessorFactory {
    conversion: Arc<dyn ConversionService>,
}

impl PropertyFieldAccessorFactory {
    pub fn new(conversion: Arc<dyn ConversionService>) -> Self {
        Self { conversion }
    }
}

impl FieldAccessorFactory for PropertyFieldAccessorFactory {
    fn name(&self) -> &'static str {
        "property"
    }

    fn accept(&self, _entity_type: &EntityType, field: &FieldMeta) -> bool {
        matches!(
            field.field_type,
            FieldType::Primitive(_) | FieldType::Boxed(_) | FieldType::Array(_)
        )
    }

    fn for_field(&self, entity_type: &Arc<EntityType>, field: &FieldMeta) -> Result<Arc<dyn FieldAccessor>> {
        Ok(Arc::new(PropertyFieldAccessor::new(entity_type, field, Arc::clone(&self.conversion))))
    }
}

// ============================================================================
// ConvertingPropertyFieldAccessor
// ============================================================================

/// Property accessor for types the store cannot hold natively. Converts in
/// both directions through the conversion service.
pub struct ConvertingPropertyFieldAccessor {
    inner: PropertyFieldAccessor,
}

impl ConvertingPropertyFieldAccessor {
    fn to_store(&self, new_val: &FieldValue) -> Result<FieldValue> {
        let inner = &self.inner;
        match new_val {
            v if v.is_null() => Ok(FieldValue::Null),
            FieldValue::Value(v) => Ok(FieldValue::from(inner.conversion.to_store(v, &inner.field_type)?)),
            other => Err(Error::TypeMismatch {
                expected: inner.field_type.describe(),
                got: other.describe(),
            }),
        }
    }
}

impl FieldAccessor for ConvertingPropertyFieldAccessor {
    fn get_value(&self, entity: &Entity) -> Result<FieldValue> {
        let inner = &self.inner;
        let element = require_element(entity, &inner.field)?;
        let stored = entity.context().store().get_property_opt(element, &inner.property)?;
        let value = match stored {
            None => inner.field_type.default_value(),
            Some(v) => inner.conversion.to_field(&v, &inner.field_type)?,
        };
        Ok(FieldValue::from(value))
    }

    fn set_value(&self, entity: &Entity, new_val: FieldValue) -> Result<FieldValue> {
        let stored = self.to_store(&new_val)?;
        self.inner.set_value(entity, stored)?;
        Ok(new_val)
    }

    fn is_writeable(&self, _entity: &Entity) -> bool {
        true
    }

    /// Runs the conversion, so an unknown enum variant fails here too.
    fn check_value(&self, _entity: &Entity, new_val: &FieldValue) -> Result<()> {
        self.to_store(new_val).map(|_| ())
    }
}

pub struct ConvertingPropertyFieldAccessorFactory {
    conversion: Arc<dyn ConversionService>,
}

impl ConvertingPropertyFieldAccessorFactory {
    pub fn new(conversion: Arc<dyn ConversionService>) -> Self {
        Self { conversion }
    }
}

impl FieldAccessorFactory for ConvertingPropertyFieldAccessorFactory {
    fn name(&self) -> &'static str {
        "converting-property"
    }

    fn accept(&self, _entity_type: &EntityType, field: &FieldMeta) -> bool {
        self.conversion.can_convert(&field.field_type)
    }

    fn for_field(&self, entity_type: &Arc<EntityType>, field: &FieldMeta) -> Result<Arc<dyn FieldAccessor>> {
        Ok(Arc::new(ConvertingPropertyFieldAccessor {
            inner: PropertyFieldAccessor::new(entity_type, field, Arc::clone(&self.conversion)),
        }))
    }
}
