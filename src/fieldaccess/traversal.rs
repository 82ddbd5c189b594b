//! Computed fields backed by a declared traversal.

use std::sync::Arc;

use crate::entity::{Entity, EntitySet, FieldValue};
use crate::mapping::{EntityType, FieldMeta, TraversalDescription};
use crate::model::{GraphElement, NodeId};
use crate::storage::ExpandDepth;
use crate::{Error, Result};

use super::{read_only, require_node, FieldAccessor, FieldAccessorFactory};

/// Runs the traversal from the entity's node on every read and returns the
/// distinct nodes reached, start node excluded. Nothing is cached.
pub struct TraversalFieldAccessor {
    entity_type: Arc<EntityType>,
    field: String,
    description: TraversalDescription,
    target_type: String,
    depth_cap: usize,
}

impl FieldAccessor for TraversalFieldAccessor {
    fn get_value(&self, entity: &Entity) -> Result<FieldValue> {
        let start = require_node(entity, &self.field)?;
        let max = self.description.max_depth.unwrap_or(self.depth_cap);
        let depth = ExpandDepth::Range { min: self.description.min_depth, max };
        let rel_types: Vec<&str> = self.description.rel_types.iter().map(String::as_str).collect();

        let ctx = entity.context();
        let paths = ctx.store().expand(start, self.description.direction, &rel_types, depth)?;

        let mut seen: Vec<NodeId> = Vec::new();
        let mut result = EntitySet::new();
        for path in paths {
            let Some(end) = path.end() else { continue };
            if end.id == start || seen.contains(&end.id) {
                continue;
            }
            seen.push(end.id);
            result.insert(ctx.entity_for_element(GraphElement::Node(end.id), &self.target_type)?);
        }
        Ok(FieldValue::Entities(result))
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

pub struct TraversalFieldAccessorFactory {
    depth_cap: usize,
}

impl TraversalFieldAccessorFactory {
    pub fn new(depth_cap: usize) -> Self {
        Self { depth_cap }
    }
}

impl FieldAccessorFactory for TraversalFieldAccessorFactory {
    fn name(&self) -> &'static str {
        "traversal"
    }

    fn accept(&self, _entity_type: &EntityType, field: &FieldMeta) -> bool {
        field.annotations.graph_traversal.is_some()
    }

    fn for_field(&self, entity_type: &Arc<EntityType>, field: &FieldMeta) -> Result<Arc<dyn FieldAccessor>> {
        let target_type = field.field_type.target_type().ok_or_else(|| {
            Error::Configuration(format!(
                "traversal field '{}' of {} must be a reference set",
                field.name,
                entity_type.name()
            ))
        })?;
        let description = field.annotations.graph_traversal.clone().unwrap_or_else(|| {
            TraversalDescription::new(crate::model::Direction::Outgoing)
        });
        Ok(Arc::new(TraversalFieldAccessor {
            entity_type: Arc::clone(entity_type),
            field: field.name.clone(),
            description,
            target_type: target_type.to_string(),
            depth_cap: self.depth_cap,
        }))
    }
}
