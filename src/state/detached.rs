//! Write buffering for entities used outside of a transaction.

use tracing::{debug, warn};

use crate::entity::{Entity, FieldValue};
use crate::{Error, Result};

use super::EntityState;

/// Value of a field when it was first written while detached.
#[derive(Debug, Clone)]
struct DirtyEntry {
    previous: FieldValue,
    /// Whether `previous` was read from the backing element and has to be
    /// checked against it before the flush overwrites it.
    from_graph: bool,
}

/// Decorator that lets an entity be used as a plain object while detached.
///
/// The entity is detached when no transaction is running, when it has no
/// backing element, or while it has buffered writes. In that condition:
///
/// - writes are checked by the field's accessor, then kept in memory
///   only; the first write of a field records the field's value at that
///   moment,
/// - reads of a buffered field, or of any field before a backing element
///   exists, return null rather than the buffered value.
///
/// [`persist`](EntityState::persist) creates the backing element and
/// flushes. Flushing compares every recorded value that came from the
/// graph with what the graph holds now and fails with
/// [`Error::ConcurrentModification`] on a difference; otherwise the
/// in-memory values are written in the order the fields were first
/// buffered.
pub struct DetachedEntityState<S> {
    delegate: S,
    /// Insertion ordered; at most one entry per field.
    dirty: Vec<(String, DirtyEntry)>,
}

impl<S: EntityState> DetachedEntityState<S> {
    pub fn new(delegate: S) -> Self {
        Self { delegate, dirty: Vec::new() }
    }

    fn transaction_is_running(entity: &Entity) -> bool {
        entity.context().transaction_is_running()
    }

    fn is_detached(&self, entity: &Entity) -> bool {
        !Self::transaction_is_running(entity) || !entity.has_persistent_state() || !self.dirty.is_empty()
    }

    fn previous_value(&mut self, entity: &Entity, field: &str) -> Result<DirtyEntry> {
        if entity.has_persistent_state() {
            let current = self.delegate.get_value(entity, field)?;
            return Ok(DirtyEntry { previous: current.snapshot(), from_graph: true });
        }
        let previous = entity
            .field_value(field)
            .map(|v| v.snapshot())
            .or_else(|| self.delegate.default_implementation(field))
            .or_else(|| {
                entity
                    .entity_type()
                    .get_field(field)
                    .map(|meta| FieldValue::from(meta.field_type.default_value()))
            })
            .unwrap_or(FieldValue::Null);
        Ok(DirtyEntry { previous, from_graph: false })
    }

    /// Write every buffered field into the backing element.
    fn flush_dirty(&mut self, entity: &Entity) -> Result<()> {
        if self.dirty.is_empty() {
            return Ok(());
        }
        let element = entity.element().ok_or_else(|| {
            Error::ResourceUsage(format!("cannot flush {entity:?}: no backing element"))
        })?;
        let Self { delegate, dirty } = self;
        for (field, entry) in dirty.iter() {
            if entry.from_graph {
                let current = delegate.get_value(entity, field)?;
                if !current.same_as(&entry.previous) {
                    return Err(Error::ConcurrentModification {
                        element: element.to_string(),
                        field: field.clone(),
                        expected: entry.previous.describe(),
                        found: current.describe(),
                    });
                }
            }
            let value = entity.field_value(field).unwrap_or(FieldValue::Null);
            debug!(entity = ?entity, field = %field, "flushing dirty field");
            let written = delegate.set_value(entity, field, value)?;
            entity.store_field_value(field, written);
        }
        dirty.clear();
        Ok(())
    }
}

impl<S: EntityState> EntityState for DetachedEntityState<S> {
    fn is_writable(&self, entity: &Entity, field: &str) -> bool {
        self.delegate.is_writable(entity, field)
    }

    fn get_value(&mut self, entity: &Entity, field: &str) -> Result<FieldValue> {
        if self.is_detached(entity) {
            if !entity.has_persistent_state() || self.is_field_dirty(field) {
                debug!(entity = ?entity, field = %field, "detached read of buffered or unbound field");
                return Ok(FieldValue::Null);
            }
        } else {
            self.flush_dirty(entity)?;
        }
        self.delegate.get_value(entity, field)
    }

    fn set_value(&mut self, entity: &Entity, field: &str, new_val: FieldValue) -> Result<FieldValue> {
        if self.is_detached(entity) {
            self.delegate.check_value(entity, field, &new_val)?;
            if !self.is_field_dirty(field) && self.delegate.is_writable(entity, field) {
                let entry = self.previous_value(entity, field)?;
                self.dirty.push((field.to_string(), entry));
            }
            debug!(entity = ?entity, field = %field, "detached write buffered");
            return Ok(new_val);
        }
        self.flush_dirty(entity)?;
        self.delegate.set_value(entity, field, new_val)
    }

    fn check_value(&self, entity: &Entity, field: &str, new_val: &FieldValue) -> Result<()> {
        self.delegate.check_value(entity, field, new_val)
    }

    fn create_and_assign_state(&mut self, entity: &Entity) -> Result<()> {
        if !Self::transaction_is_running(entity) {
            warn!(entity = ?entity, "create_and_assign_state called outside of a transaction");
        }
        self.delegate.create_and_assign_state(entity)
    }

    fn persist(&mut self, entity: &Entity) -> Result<()> {
        if !Self::transaction_is_running(entity) {
            return Err(Error::ResourceUsage(format!(
                "cannot persist {entity:?} outside of a transaction"
            )));
        }
        // Recheck before the element is created; a failed flush cannot
        // take the element back.
        for (field, _) in &self.dirty {
            let value = entity.field_value(field).unwrap_or(FieldValue::Null);
            self.delegate.check_value(entity, field, &value)?;
        }
        self.delegate.persist(entity)?;
        self.flush_dirty(entity)
    }

    fn default_implementation(&self, field: &str) -> Option<FieldValue> {
        self.delegate.default_implementation(field)
    }

    fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    fn is_field_dirty(&self, field: &str) -> bool {
        self.dirty.iter().any(|(f, _)| f == field)
    }
}
