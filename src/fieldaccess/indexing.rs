//! Mirrors indexed property values into secondary indexes.

use std::sync::Arc;

use crate::config::OgmConfig;
use crate::convert::ConversionService;
use crate::entity::{Entity, FieldValue};
use crate::index::{IndexType, IndexValue};
use crate::mapping::{EntityType, FieldMeta, FieldType};
use crate::storage::GraphStore;
use crate::{Error, Result};

use super::{require_element, FieldAccessListener, FieldAccessorListenerFactory};

/// Keeps one index entry per element and property key in line with the
/// property's current value. A null value removes the entry.
pub struct IndexingPropertyFieldAccessorListener {
    index_name: String,
    index_type: IndexType,
    key: String,
    field: String,
    field_type: FieldType,
    conversion: Arc<dyn ConversionService>,
}

impl IndexingPropertyFieldAccessorListener {
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }
}

impl FieldAccessListener for IndexingPropertyFieldAccessorListener {
    fn value_changed(&self, entity: &Entity, _old: &FieldValue, new: &FieldValue) -> Result<()> {
        let element = require_element(entity, &self.field)?;
        let store = entity.context().store();
        // A rolled back transaction may have dropped the index declaration.
        store.create_index(&self.index_name, self.index_type)?;
        store.index_remove(&self.index_name, element, &self.key)?;

        let Some(value) = new.as_value().filter(|v| !v.is_null()) else {
            return Ok(());
        };
        let stored = if self.conversion.can_convert(&self.field_type) {
            self.conversion.to_store(value, &self.field_type)?
        } else {
            value.clone()
        };
        store.index_add(&self.index_name, element, &self.key, IndexValue::wrap(&stored))
    }
}

pub struct IndexingPropertyFieldAccessorListenerFactory {
    store: Arc<dyn GraphStore>,
    conversion: Arc<dyn ConversionService>,
    index_all_properties: bool,
}

impl IndexingPropertyFieldAccessorListenerFactory {
    pub fn new(store: Arc<dyn GraphStore>, conversion: Arc<dyn ConversionService>, config: &OgmConfig) -> Self {
        Self { store, conversion, index_all_properties: config.index_all_properties }
    }
}

impl FieldAccessorListenerFactory for IndexingPropertyFieldAccessorListenerFactory {
    fn name(&self) -> &'static str {
        "indexing"
    }

    fn accept(&self, entity_type: &EntityType, field: &FieldMeta) -> bool {
        let annotations = &field.annotations;
        field.field_type.is_property_like()
            && !annotations.id
            && !annotations.transient
            && (annotations.indexed.is_some() || entity_type.is_indexed() || self.index_all_properties)
    }

    fn for_field(
        &self,
        entity_type: &Arc<EntityType>,
        field: &FieldMeta,
    ) -> Result<Arc<dyn FieldAccessListener>> {
        let indexed = field.annotations.indexed.clone().unwrap_or_default();
        let default_name = entity_type.default_index_name();
        let index_name = match (indexed.index_type, indexed.index_name) {
            (IndexType::FullText, None) => {
                return Err(Error::Configuration(format!(
                    "fulltext field '{}' of {} needs an explicit index name",
                    field.name,
                    entity_type.name()
                )));
            }
            (IndexType::FullText, Some(name)) if name == default_name => {
                return Err(Error::Configuration(format!(
                    "fulltext field '{}' of {} cannot use the default index '{name}'",
                    field.name,
                    entity_type.name()
                )));
            }
            (_, Some(name)) => name,
            (_, None) => default_name.to_string(),
        };
        self.store.create_index(&index_name, indexed.index_type)?;
        Ok(Arc::new(IndexingPropertyFieldAccessorListener {
            index_name,
            index_type: indexed.index_type,
            key: entity_type.property_name(&field.name),
            field: field.name.clone(),
            field_type: field.field_type.clone(),
            conversion: Arc::clone(&self.conversion),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OgmContext;
    use crate::index::IndexQuery;
    use crate::mapping::ScalarKind;
    use crate::model::Value;

    #[test]
    fn test_null_removes_entry() {
        let ctx = OgmContext::in_memory();
        let ty = ctx.register(
            EntityType::node("Person")
                .field(FieldMeta::new("age", FieldType::Boxed(ScalarKind::Int)).indexed()),
        );
        let tx = ctx.begin_tx().unwrap();
        let p = ctx.new_entity(&ty).unwrap();
        let element = p.element().unwrap();

        p.set("age", 35).unwrap();
        let range = IndexQuery::Range { min: Some(30.0), max: Some(40.0) };
        assert_eq!(ctx.store().index_query("Person", "age", &range).unwrap(), vec![element]);

        p.set("age", FieldValue::Null).unwrap();
        assert!(ctx.store().index_get("Person", "age", &Value::Int(35)).unwrap().is_empty());
        tx.commit().unwrap();
    }

    #[test]
    fn test_fulltext_needs_explicit_name() {
        let ctx = OgmContext::in_memory();
        let unnamed = ctx.register(
            EntityType::node("Article")
                .field(FieldMeta::new("body", FieldType::Boxed(ScalarKind::String)).fulltext(None)),
        );
        assert!(matches!(ctx.new_entity(&unnamed), Err(Error::Configuration(_))));

        let default_named = ctx.register(
            EntityType::node("Note")
                .field(FieldMeta::new("body", FieldType::Boxed(ScalarKind::String)).fulltext(Some("Note"))),
        );
        assert!(matches!(ctx.new_entity(&default_named), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_index_all_properties() {
        let config = OgmConfig { index_all_properties: true, ..OgmConfig::default() };
        let ctx = OgmContext::builder().config(config).build().unwrap();
        let ty = ctx.register(
            EntityType::node("City").field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String))),
        );
        let tx = ctx.begin_tx().unwrap();
        let city = ctx.new_entity(&ty).unwrap();
        city.set("name", "Lyon").unwrap();
        assert_eq!(
            ctx.store().index_get("City", "name", &Value::from("Lyon")).unwrap(),
            vec![city.element().unwrap()]
        );
        tx.commit().unwrap();
    }
}
