//! Graph-backed entities and the values their fields hold.
//!
//! An [`Entity`] is a handle to one domain object: its type metadata, its
//! in-memory field slots, the (at most one) backing graph element and the
//! entity state that decides how field reads and writes reach the graph.
//! Domain types wrap an `Entity` and expose typed getters and setters that
//! go through [`Entity::get`] and [`Entity::set`].

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;

use crate::context::OgmContext;
use crate::fieldaccess::ManagedSet;
use crate::mapping::EntityType;
use crate::model::{GraphElement, NodeId, PropertyMap, RelId, Value};
use crate::state::EntityState;
use crate::{Error, Result};

// ============================================================================
// FieldValue
// ============================================================================

/// The value of one entity field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Null,
    /// Scalar, array or converted property value.
    Value(Value),
    /// Single reference.
    Entity(Entity),
    /// Plain set of references.
    Entities(EntitySet),
    /// Live set whose mutations are written through to the graph.
    Managed(ManagedSet),
    /// Dynamic properties.
    Properties(PropertyMap),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Value(v) => v.is_null(),
            _ => false,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn as_int(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_int)
    }

    pub fn as_float(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_float)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            FieldValue::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_managed(&self) -> Option<&ManagedSet> {
        match self {
            FieldValue::Managed(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_properties(&self) -> Option<&PropertyMap> {
        match self {
            FieldValue::Properties(p) => Some(p),
            _ => None,
        }
    }

    /// Members of a set-valued field, copied out of a managed set if needed.
    pub fn entities(&self) -> Option<EntitySet> {
        match self {
            FieldValue::Entities(set) => Some(set.clone()),
            FieldValue::Managed(managed) => Some(managed.snapshot()),
            _ => None,
        }
    }

    /// A detached copy: managed sets become plain sets so later mutations
    /// of the live set do not change this value.
    pub fn snapshot(&self) -> FieldValue {
        match self {
            FieldValue::Managed(managed) => FieldValue::Entities(managed.snapshot()),
            other => other.clone(),
        }
    }

    /// Content equality used by the concurrent-modification check.
    /// Entities compare by identity, sets by membership, null equals an
    /// empty set.
    pub fn same_as(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Entity(a), FieldValue::Entity(b)) => a == b,
            (FieldValue::Properties(a), FieldValue::Properties(b)) => a == b,
            (FieldValue::Value(a), FieldValue::Value(b)) => a == b,
            (a, b) if a.is_null() && b.is_null() => true,
            (a, b) => match (a.entities(), b.entities()) {
                (Some(x), Some(y)) => x.same_members(&y),
                (Some(x), None) if b.is_null() => x.is_empty(),
                (None, Some(y)) if a.is_null() => y.is_empty(),
                _ => false,
            },
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FieldValue::Null => "null".to_string(),
            FieldValue::Value(v) => v.to_string(),
            FieldValue::Entity(e) => format!("{e:?}"),
            FieldValue::Entities(set) => format!("{} entities", set.len()),
            FieldValue::Managed(m) => format!("{} entities (managed)", m.len()),
            FieldValue::Properties(p) => format!("{} dynamic properties", p.len()),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        if v.is_null() { FieldValue::Null } else { FieldValue::Value(v) }
    }
}
impl From<bool> for FieldValue { fn from(v: bool) -> Self { FieldValue::Value(v.into()) } }
impl From<i32> for FieldValue { fn from(v: i32) -> Self { FieldValue::Value(v.into()) } }
impl From<i64> for FieldValue { fn from(v: i64) -> Self { FieldValue::Value(v.into()) } }
impl From<f64> for FieldValue { fn from(v: f64) -> Self { FieldValue::Value(v.into()) } }
impl From<char> for FieldValue { fn from(v: char) -> Self { FieldValue::Value(v.into()) } }
impl From<&str> for FieldValue { fn from(v: &str) -> Self { FieldValue::Value(v.into()) } }
impl From<String> for FieldValue { fn from(v: String) -> Self { FieldValue::Value(v.into()) } }
impl From<NaiveDate> for FieldValue { fn from(v: NaiveDate) -> Self { FieldValue::Value(v.into()) } }
impl From<DateTime<Utc>> for FieldValue { fn from(v: DateTime<Utc>) -> Self { FieldValue::Value(v.into()) } }
impl From<Entity> for FieldValue { fn from(v: Entity) -> Self { FieldValue::Entity(v) } }
impl From<&Entity> for FieldValue { fn from(v: &Entity) -> Self { FieldValue::Entity(v.clone()) } }
impl From<EntitySet> for FieldValue { fn from(v: EntitySet) -> Self { FieldValue::Entities(v) } }
impl From<ManagedSet> for FieldValue { fn from(v: ManagedSet) -> Self { FieldValue::Managed(v) } }
impl From<PropertyMap> for FieldValue { fn from(v: PropertyMap) -> Self { FieldValue::Properties(v) } }
impl From<Option<Entity>> for FieldValue {
    fn from(v: Option<Entity>) -> Self { v.map(FieldValue::Entity).unwrap_or(FieldValue::Null) }
}

// ============================================================================
// EntitySet
// ============================================================================

/// Insertion-ordered set of entities under entity identity.
#[derive(Debug, Clone, Default)]
pub struct EntitySet {
    items: Vec<Entity>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless already present. Returns whether the set changed.
    pub fn insert(&mut self, entity: Entity) -> bool {
        if self.contains(&entity) {
            return false;
        }
        self.items.push(entity);
        true
    }

    pub fn remove(&mut self, entity: &Entity) -> bool {
        let before = self.items.len();
        self.items.retain(|e| e != entity);
        self.items.len() != before
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.items.iter().any(|e| e == entity)
    }

    pub fn retain(&mut self, keep: impl FnMut(&Entity) -> bool) {
        self.items.retain(keep);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<Entity> {
        self.items.clone()
    }

    pub fn same_members(&self, other: &EntitySet) -> bool {
        self.len() == other.len() && self.iter().all(|e| other.contains(e))
    }
}

impl FromIterator<Entity> for EntitySet {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut set = EntitySet::new();
        for entity in iter {
            set.insert(entity);
        }
        set
    }
}

impl IntoIterator for EntitySet {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a EntitySet {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ============================================================================
// Entity
// ============================================================================

/// Handle to one graph-backed domain object. Cloning shares the instance.
///
/// Two handles are equal when they are the same instance or when both are
/// backed by the same graph element.
#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

pub(crate) struct EntityInner {
    entity_type: Arc<EntityType>,
    context: Arc<OgmContext>,
    element: OnceLock<GraphElement>,
    removed: AtomicBool,
    fields: Mutex<HashMap<String, FieldValue>>,
    state: Mutex<Box<dyn EntityState>>,
}

impl Entity {
    pub(crate) fn new(
        context: Arc<OgmContext>,
        entity_type: Arc<EntityType>,
        state: Box<dyn EntityState>,
    ) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                entity_type,
                context,
                element: OnceLock::new(),
                removed: AtomicBool::new(false),
                fields: Mutex::new(HashMap::new()),
                state: Mutex::new(state),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<EntityInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<EntityInner>) -> Option<Entity> {
        weak.upgrade().map(|inner| Entity { inner })
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.inner.entity_type
    }

    pub fn context(&self) -> &Arc<OgmContext> {
        &self.inner.context
    }

    /// The backing graph element, once assigned.
    pub fn element(&self) -> Option<GraphElement> {
        self.inner.element.get().copied()
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.element().and_then(|e| e.as_node())
    }

    pub fn relationship_id(&self) -> Option<RelId> {
        self.element().and_then(|e| e.as_relationship())
    }

    pub fn has_persistent_state(&self) -> bool {
        self.inner.element.get().is_some()
    }

    pub fn is_removed(&self) -> bool {
        self.inner.removed.load(Ordering::Acquire)
    }

    /// Whether both handles point at the same in-memory instance.
    pub fn same_instance(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Assign the backing element. Happens once; assigning a different
    /// element afterwards is an error.
    pub(crate) fn assign_element(&self, element: GraphElement) -> Result<()> {
        if let Err(element) = self.inner.element.set(element) {
            if self.element() != Some(element) {
                return Err(Error::IllegalUsage(format!(
                    "{self:?} is already backed by another element, cannot rebind to {element}"
                )));
            }
            return Ok(());
        }
        self.inner.context.register_instance(element, self);
        Ok(())
    }

    pub(crate) fn mark_removed(&self) {
        self.inner.removed.store(true, Ordering::Release);
    }

    fn ensure_usable(&self, field: Option<&str>) -> Result<()> {
        if self.is_removed() {
            return Err(Error::EntityRemoved(format!("{self:?}")));
        }
        if let Some(field) = field {
            if self.inner.entity_type.get_field(field).is_none() {
                return Err(Error::IllegalUsage(format!(
                    "{} has no field '{field}'",
                    self.inner.entity_type.name()
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Field access
    // ========================================================================

    /// Read a field through the entity state.
    pub fn get(&self, field: &str) -> Result<FieldValue> {
        self.ensure_usable(Some(field))?;
        self.inner.state.lock().get_value(self, field)
    }

    /// Write a field through the entity state. The value the state returns
    /// becomes the in-memory value of the field and is returned.
    pub fn set(&self, field: &str, value: impl Into<FieldValue>) -> Result<FieldValue> {
        self.ensure_usable(Some(field))?;
        let stored = self.inner.state.lock().set_value(self, field, value.into())?;
        self.inner.fields.lock().insert(field.to_string(), stored.clone());
        Ok(stored)
    }

    /// The plain in-memory value of a field, bypassing the entity state.
    pub fn field_value(&self, field: &str) -> Option<FieldValue> {
        self.inner.fields.lock().get(field).cloned()
    }

    /// Read a property of the backing element directly. A missing property
    /// is the store's [`Error::NotFound`], not a default.
    pub fn read_property(&self, key: &str) -> Result<Value> {
        self.ensure_usable(None)?;
        let element = self.element().ok_or_else(|| {
            Error::ResourceUsage(format!("{self:?} has no backing element"))
        })?;
        self.inner.context.store().get_property(element, key)
    }

    pub(crate) fn store_field_value(&self, field: &str, value: FieldValue) {
        self.inner.fields.lock().insert(field.to_string(), value);
    }

    pub fn is_writable(&self, field: &str) -> bool {
        self.inner.state.lock().is_writable(self, field)
    }

    /// Whether writes are buffered and waiting for a flush.
    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().is_dirty()
    }

    pub fn is_field_dirty(&self, field: &str) -> bool {
        self.inner.state.lock().is_field_dirty(field)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Attach to an existing element or create a new one. Needs a running
    /// transaction.
    pub fn create_and_assign_state(&self) -> Result<()> {
        self.ensure_usable(None)?;
        self.inner.state.lock().create_and_assign_state(self)
    }

    /// Create or reattach the backing element and flush buffered writes.
    /// Needs a running transaction; see [`OgmContext::save`] for the
    /// self-contained variant.
    pub fn persist(&self) -> Result<Entity> {
        self.ensure_usable(None)?;
        self.inner.state.lock().persist(self)?;
        Ok(self.clone())
    }

    /// Delete the backing element. The entity is unusable afterwards.
    pub fn remove(&self) -> Result<()> {
        self.ensure_usable(None)?;
        self.inner.context.remove(self)
    }

    /// Create a relationship entity of `relationship_type` from this node
    /// entity to `target`.
    pub fn relate_to(&self, target: &Entity, relationship_type: &Arc<EntityType>) -> Result<Entity> {
        self.ensure_usable(None)?;
        target.ensure_usable(None)?;
        self.inner.context.relate(self, target, relationship_type)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        if self.same_instance(other) {
            return true;
        }
        match (self.element(), other.element()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.element() {
            Some(element) => write!(f, "{}({element})", self.inner.entity_type.name()),
            None => write!(f, "{}(unbound@{:p})", self.inner.entity_type.name(), Arc::as_ptr(&self.inner)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_people() -> (Arc<OgmContext>, Entity, Entity) {
        let ctx = OgmContext::in_memory();
        let ty = ctx.register(EntityType::node("Person"));
        let a = ctx.new_entity(&ty).unwrap();
        let b = ctx.new_entity(&ty).unwrap();
        (ctx, a, b)
    }

    #[test]
    fn test_entity_set_keeps_insertion_order_without_duplicates() {
        let (_ctx, a, b) = two_people();
        let mut set = EntitySet::new();
        assert!(set.insert(b.clone()));
        assert!(set.insert(a.clone()));
        assert!(!set.insert(b.clone()));
        assert_eq!(set.to_vec(), vec![b.clone(), a.clone()]);

        let reversed: EntitySet = [a.clone(), b.clone()].into_iter().collect();
        assert!(set.same_members(&reversed));
        assert!(set.remove(&a));
        assert!(!set.same_members(&reversed));
    }

    #[test]
    fn test_same_as_treats_null_as_empty_set() {
        let (_ctx, a, _b) = two_people();
        assert!(FieldValue::Null.same_as(&FieldValue::Entities(EntitySet::new())));
        assert!(FieldValue::Entities(EntitySet::new()).same_as(&FieldValue::Null));
        let one: EntitySet = [a.clone()].into_iter().collect();
        assert!(!FieldValue::Null.same_as(&FieldValue::Entities(one)));
        assert!(FieldValue::from(&a).same_as(&FieldValue::Entity(a.clone())));
        assert!(!FieldValue::from("x").same_as(&FieldValue::Null));
    }

    #[test]
    fn test_unbound_entities_compare_by_instance() {
        let (_ctx, a, b) = two_people();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert!(format!("{a:?}").starts_with("Person(unbound@"));
    }

    #[test]
    fn test_null_value_converts_to_null_field() {
        assert!(FieldValue::from(Value::Null).is_null());
        assert_eq!(FieldValue::from(3).as_int(), Some(3));
        assert!(FieldValue::from(None::<Entity>).is_null());
    }
}
