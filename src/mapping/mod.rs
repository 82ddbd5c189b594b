//! # Mapping Metadata
//!
//! Declarative description of entity types: which fields exist, how they
//! are typed and which relationships, indexes and traversals back them.
//! The [`MappingContext`] is the registry of all known types.

pub mod entity_type;
pub mod field;

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::{Error, Result};

pub use entity_type::{EntityKind, EntityType};
pub use field::{
    FieldAnnotations, FieldMeta, FieldType, Indexed, RelatedTo, ScalarKind,
    TraversalDescription,
};

/// Registry of entity types by name.
#[derive(Default)]
pub struct MappingContext {
    types: RwLock<HashMap<String, Arc<EntityType>>>,
}

impl MappingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, replacing any previous type of the same name.
    pub fn register(&self, entity_type: EntityType) -> Arc<EntityType> {
        let entity_type = Arc::new(entity_type);
        self.types
            .write()
            .insert(entity_type.name().to_string(), Arc::clone(&entity_type));
        entity_type
    }

    pub fn get(&self, name: &str) -> Option<Arc<EntityType>> {
        self.types.read().get(name).cloned()
    }

    /// Look up a type that mapping metadata refers to.
    pub fn require(&self, name: &str) -> Result<Arc<EntityType>> {
        self.get(name)
            .ok_or_else(|| Error::Configuration(format!("unknown entity type '{name}'")))
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
