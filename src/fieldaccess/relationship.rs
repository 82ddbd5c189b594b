//! Reference fields backed by graph adjacency.
//!
//! A reference field is declared with a relationship type and a direction.
//! Writes compute the difference between the requested targets and the
//! currently connected ones and only create or delete what changed, so
//! saving the same object graph twice never duplicates relationships.
//!
//! Relationships declared with [`Direction::Both`] are read in both
//! directions and created outgoing from the owning entity.

use std::sync::Arc;

use tracing::debug;

use crate::entity::{Entity, EntitySet, FieldValue};
use crate::mapping::{EntityType, FieldMeta, FieldType};
use crate::model::{Direction, GraphElement, NodeId, PropertyMap, RelId, Relationship};
use crate::{Error, Result};

use super::managed::ManagedSet;
use super::{read_only, require_node, FieldAccessor, FieldAccessorFactory};

// ============================================================================
// RelationshipHelper
// ============================================================================

/// Shared adjacency logic of the reference accessors.
pub struct RelationshipHelper {
    field: String,
    rel_type: String,
    direction: Direction,
    target_type: String,
}

impl RelationshipHelper {
    pub fn new(field: &FieldMeta) -> Result<Self> {
        let target_type = field.field_type.target_type().ok_or_else(|| {
            Error::Configuration(format!(
                "field '{}' of type {} is not a reference",
                field.name,
                field.field_type.describe()
            ))
        })?;
        let related = field.relationship();
        Ok(Self {
            field: field.name.clone(),
            rel_type: related.rel_type,
            direction: related.direction,
            target_type: target_type.to_string(),
        })
    }

    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn target_type(&self) -> &str {
        &self.target_type
    }

    /// Reject values that are not entities of the target type.
    pub fn check_target(&self, target: &Entity) -> Result<()> {
        if target.entity_type().name() != self.target_type {
            return Err(Error::TypeMismatch {
                expected: self.target_type.clone(),
                got: target.entity_type().name().to_string(),
            });
        }
        Ok(())
    }

    /// Backing node of `target`, persisting it first if it has none.
    pub fn get_or_create_state(&self, owner: &Entity, target: &Entity) -> Result<NodeId> {
        if target.same_instance(owner) {
            return require_node(owner, &self.field);
        }
        if !target.has_persistent_state() {
            debug!(field = %self.field, target = ?target, "cascade persist of relationship target");
            target.persist()?;
        }
        require_node(target, &self.field)
    }

    /// Relationships of this field visible from `node`. Relationships whose
    /// other end carries a different type alias belong to another field.
    pub fn relationships(&self, owner: &Entity, node: NodeId) -> Result<Vec<Relationship>> {
        let ctx = owner.context();
        let store = ctx.store();
        let type_property = &ctx.config().type_property;
        let mut matching = Vec::new();
        for rel in store.get_relationships(node, self.direction, Some(&self.rel_type))? {
            let other = rel.other_node(node).unwrap_or(rel.dst);
            let alias_matches = match store.get_node(other)? {
                Some(n) => n.type_alias(type_property).is_none_or(|alias| alias == self.target_type),
                None => false,
            };
            if alias_matches {
                matching.push(rel);
            }
        }
        Ok(matching)
    }

    /// Distinct nodes connected through this field, in relationship order.
    pub fn connected_nodes(&self, owner: &Entity, node: NodeId) -> Result<Vec<NodeId>> {
        let mut nodes = Vec::new();
        for rel in self.relationships(owner, node)? {
            let other = rel.other_node(node).unwrap_or(rel.dst);
            if !nodes.contains(&other) {
                nodes.push(other);
            }
        }
        Ok(nodes)
    }

    pub fn create_relationship(&self, owner: &Entity, from: NodeId, to: NodeId) -> Result<RelId> {
        let (src, dst) = match self.direction {
            Direction::Incoming => (to, from),
            Direction::Outgoing | Direction::Both => (from, to),
        };
        let rel = owner
            .context()
            .store()
            .create_relationship(src, dst, &self.rel_type, PropertyMap::new())?;
        debug!(field = %self.field, rel_type = %self.rel_type, %src, %dst, "relationship created");
        Ok(rel)
    }

    /// Bring the relationships of `owner` in line with `targets`: remove
    /// those to nodes no longer present, create those to new nodes and
    /// leave the rest untouched.
    pub fn sync(&self, owner: &Entity, targets: &EntitySet) -> Result<()> {
        let node = require_node(owner, &self.field)?;
        let mut target_nodes = Vec::with_capacity(targets.len());
        for target in targets {
            self.check_target(target)?;
            let target_node = self.get_or_create_state(owner, target)?;
            if !target_nodes.contains(&target_node) {
                target_nodes.push(target_node);
            }
        }

        let store = owner.context().store();
        let mut connected = Vec::new();
        for rel in self.relationships(owner, node)? {
            let other = rel.other_node(node).unwrap_or(rel.dst);
            if target_nodes.contains(&other) {
                connected.push(other);
            } else {
                store.delete_relationship(rel.id)?;
                debug!(field = %self.field, rel = %rel.id, "relationship deleted");
            }
        }
        for target_node in target_nodes {
            if !connected.contains(&target_node) {
                self.create_relationship(owner, node, target_node)?;
            }
        }
        Ok(())
    }

    pub fn materialize(&self, owner: &Entity, node: NodeId) -> Result<Entity> {
        owner
            .context()
            .entity_for_element(GraphElement::Node(node), &self.target_type)
    }

    pub fn targets(&self, owner: &Entity) -> Result<EntitySet> {
        let node = require_node(owner, &self.field)?;
        self.connected_nodes(owner, node)?
            .into_iter()
            .map(|n| self.materialize(owner, n))
            .collect::<Result<EntitySet>>()
    }

    /// Members of a set-valued write. Null is the empty set.
    pub fn members(&self, new_val: &FieldValue) -> Result<EntitySet> {
        if new_val.is_null() {
            return Ok(EntitySet::new());
        }
        let members = new_val.entities().ok_or_else(|| Error::TypeMismatch {
            expected: format!("Set<{}>", self.target_type),
            got: new_val.describe(),
        })?;
        for member in &members {
            self.check_target(member)?;
        }
        Ok(members)
    }
}

// ============================================================================
// Single relationship
// ============================================================================

/// A single reference field.
pub struct SingleRelationshipFieldAccessor {
    helper: RelationshipHelper,
}

impl FieldAccessor for SingleRelationshipFieldAccessor {
    fn get_value(&self, entity: &Entity) -> Result<FieldValue> {
        let node = require_node(entity, &self.helper.field)?;
        let nodes = self.helper.connected_nodes(entity, node)?;
        match nodes.as_slice() {
            [] => Ok(FieldValue::Null),
            [single] => Ok(FieldValue::Entity(self.helper.materialize(entity, *single)?)),
            _ => Err(Error::IllegalUsage(format!(
                "{entity:?} has {} '{}' relationships for single field '{}'",
                nodes.len(),
                self.helper.rel_type,
                self.helper.field
            ))),
        }
    }

    fn set_value(&self, entity: &Entity, new_val: FieldValue) -> Result<FieldValue> {
        let targets: EntitySet = self.target(entity, &new_val)?.into_iter().collect();
        self.helper.sync(entity, &targets)?;
        Ok(new_val)
    }

    fn is_writeable(&self, _entity: &Entity) -> bool {
        true
    }

    fn check_value(&self, entity: &Entity, new_val: &FieldValue) -> Result<()> {
        self.target(entity, new_val).map(|_| ())
    }
}

impl SingleRelationshipFieldAccessor {
    /// The referenced entity of a write, `None` for null.
    fn target(&self, entity: &Entity, new_val: &FieldValue) -> Result<Option<Entity>> {
        match new_val {
            v if v.is_null() => Ok(None),
            FieldValue::Entity(target) => {
                if target == entity {
                    return Err(Error::CircularReference(format!(
                        "cannot set field '{}' of {entity:?} to itself",
                        self.helper.field
                    )));
                }
                self.helper.check_target(target)?;
                Ok(Some(target.clone()))
            }
            other => Err(Error::TypeMismatch {
                expected: self.helper.target_type.clone(),
                got: other.describe(),
            }),
        }
    }
}

pub struct SingleRelationshipFieldAccessorFactory;

impl FieldAccessorFactory for SingleRelationshipFieldAccessorFactory {
    fn name(&self) -> &'static str {
        "single-relationship"
    }

    fn accept(&self, _entity_type: &EntityType, field: &FieldMeta) -> bool {
        matches!(field.field_type, FieldType::Reference(_))
            && field.annotations.graph_traversal.is_none()
    }

    fn for_field(&self, _entity_type: &Arc<EntityType>, field: &FieldMeta) -> Result<Arc<dyn FieldAccessor>> {
        Ok(Arc::new(SingleRelationshipFieldAccessor { helper: RelationshipHelper::new(field)? }))
    }
}

// ============================================================================
// One-to-n relationships
// ============================================================================

/// A set of references. Reads hand out a [`ManagedSet`].
pub struct OneToNRelationshipFieldAccessor {
    helper: RelationshipHelper,
}

impl FieldAccessor for OneToNRelationshipFieldAccessor {
    fn get_value(&self, entity: &Entity) -> Result<FieldValue> {
        let targets = self.helper.targets(entity)?;
        Ok(FieldValue::Managed(ManagedSet::new(entity, &self.helper.field, targets)))
    }

    fn set_value(&self, entity: &Entity, new_val: FieldValue) -> Result<FieldValue> {
        let members = self.helper.members(&new_val)?;
        self.helper.sync(entity, &members)?;
        match new_val {
            FieldValue::Managed(managed) => Ok(FieldValue::Managed(managed)),
            _ => Ok(FieldValue::Managed(ManagedSet::new(entity, &self.helper.field, members))),
        }
    }

    fn is_writeable(&self, _entity: &Entity) -> bool {
        true
    }

    fn check_value(&self, _entity: &Entity, new_val: &FieldValue) -> Result<()> {
        self.helper.members(new_val).map(|_| ())
    }
}

pub struct OneToNRelationshipFieldAccessorFactory;

impl FieldAccessorFactory for OneToNRelationshipFieldAccessorFactory {
    fn name(&self) -> &'static str {
        "one-to-n-relationship"
    }

    fn accept(&self, _entity_type: &EntityType, field: &FieldMeta) -> bool {
        matches!(field.field_type, FieldType::ReferenceSet(_))
            && field.annotations.graph_traversal.is_none()
            && !field.annotations.read_only
    }

    fn for_field(&self, _entity_type: &Arc<EntityType>, field: &FieldMeta) -> Result<Arc<dyn FieldAccessor>> {
        Ok(Arc::new(OneToNRelationshipFieldAccessor { helper: RelationshipHelper::new(field)? }))
    }
}

/// A set of references that can only be read. Mutations of the returned
/// set fail and leave it unchanged.
pub struct ReadOnlyOneToNRelationshipFieldAccessor {
    entity_type: Arc<EntityType>,
    helper: RelationshipHelper,
}

impl FieldAccessor for ReadOnlyOneToNRelationshipFieldAccessor {
    fn get_value(&self, entity: &Entity) -> Result<FieldValue> {
        let targets = self.helper.targets(entity)?;
        Ok(FieldValue::Managed(ManagedSet::new(entity, &self.helper.field, targets)))
    }

    fn set_value(&self, _entity: &Entity, _new_val: FieldValue) -> Result<FieldValue> {
        Err(read_only(&self.entity_type, &self.helper.field))
    }

    fn is_writeable(&self, _entity: &Entity) -> bool {
        false
    }

    fn check_value(&self, _entity: &Entity, _new_val: &FieldValue) -> Result<()> {
        Err(read_only(&self.entity_type, &self.helper.field))
    }
}

pub struct ReadOnlyOneToNRelationshipFieldAccessorFactory;

impl FieldAccessorFactory for ReadOnlyOneToNRelationshipFieldAccessorFactory {
    fn name(&self) -> &'static str {
        "read-only-one-to-n-relationship"
    }

    fn accept(&self, _entity_type: &EntityType, field: &FieldMeta) -> bool {
        matches!(field.field_type, FieldType::ReferenceSet(_))
            && field.annotations.graph_traversal.is_none()
            && field.annotations.read_only
    }

    fn for_field(&self, entity_type: &Arc<EntityType>, field: &FieldMeta) -> Result<Arc<dyn FieldAccessor>> {
        Ok(Arc::new(ReadOnlyOneToNRelationshipFieldAccessor {
            entity_type: Arc::clone(entity_type),
            helper: RelationshipHelper::new(field)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OgmContext;
    use crate::mapping::ScalarKind;

    fn setup() -> (Arc<OgmContext>, Arc<EntityType>) {
        let ctx = OgmContext::in_memory();
        let person = ctx.register(
            EntityType::node("Person")
                .field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String)))
                .field(
                    FieldMeta::new("boss", FieldType::Reference("Person".into()))
                        .related_to("BOSS", Direction::Outgoing),
                )
                .field(
                    FieldMeta::new("reports", FieldType::ReferenceSet("Person".into()))
                        .related_to("BOSS", Direction::Incoming)
                        .read_only(),
                ),
        );
        (ctx, person)
    }

    #[test]
    fn test_incoming_read_sees_outgoing_write() {
        let (ctx, person) = setup();
        let tx = ctx.begin_tx().unwrap();
        let boss = ctx.new_entity(&person).unwrap();
        let worker = ctx.new_entity(&person).unwrap();
        worker.set("boss", &boss).unwrap();

        let reports = boss.get("reports").unwrap().entities().unwrap();
        assert_eq!(reports.to_vec(), vec![worker.clone()]);
        tx.commit().unwrap();
    }

    #[test]
    fn test_read_only_set_rejects_mutation() {
        let (ctx, person) = setup();
        let tx = ctx.begin_tx().unwrap();
        let boss = ctx.new_entity(&person).unwrap();
        let worker = ctx.new_entity(&person).unwrap();
        worker.set("boss", &boss).unwrap();

        let reports = boss.get("reports").unwrap();
        let managed = reports.as_managed().unwrap();
        assert!(matches!(managed.clear(), Err(Error::ReadOnlyField { .. })));
        assert_eq!(managed.len(), 1);
        assert!(matches!(boss.set("reports", FieldValue::Null), Err(Error::ReadOnlyField { .. })));
        tx.commit().unwrap();
    }

    #[test]
    fn test_single_field_with_two_relationships_is_illegal() {
        let (ctx, person) = setup();
        let tx = ctx.begin_tx().unwrap();
        let a = ctx.new_entity(&person).unwrap();
        let b = ctx.new_entity(&person).unwrap();
        let c = ctx.new_entity(&person).unwrap();
        let store = ctx.store();
        store.create_relationship(a.node_id().unwrap(), b.node_id().unwrap(), "BOSS", PropertyMap::new()).unwrap();
        store.create_relationship(a.node_id().unwrap(), c.node_id().unwrap(), "BOSS", PropertyMap::new()).unwrap();
        assert!(matches!(a.get("boss"), Err(Error::IllegalUsage(_))));
        tx.commit().unwrap();
    }

    #[test]
    fn test_wrong_target_type_rejected() {
        let (ctx, person) = setup();
        let dog = ctx.register(EntityType::node("Dog"));
        let tx = ctx.begin_tx().unwrap();
        let owner = ctx.new_entity(&person).unwrap();
        let rex = ctx.new_entity(&dog).unwrap();
        assert!(matches!(owner.set("boss", rex), Err(Error::TypeMismatch { .. })));
        assert_eq!(ctx.store().relationship_count().unwrap(), 0);
        tx.commit().unwrap();
    }
}
