//! Live entity sets for collection-valued relationship fields.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::entity::{Entity, EntityInner, EntitySet, FieldValue};
use crate::{Error, Result};

/// A set handed out by collection-valued relationship fields.
///
/// Every mutating call changes the contents and then writes the whole set
/// back through the owning entity's field, so once it returns the graph
/// matches what the set shows. A failed write restores the previous
/// contents. Clones share contents.
#[derive(Clone)]
pub struct ManagedSet {
    owner: Weak<EntityInner>,
    field: Arc<str>,
    delegate: Arc<Mutex<EntitySet>>,
}

impl ManagedSet {
    pub(crate) fn new(owner: &Entity, field: &str, contents: EntitySet) -> Self {
        Self {
            owner: owner.downgrade(),
            field: Arc::from(field),
            delegate: Arc::new(Mutex::new(contents)),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn owner(&self) -> Option<Entity> {
        Entity::upgrade(&self.owner)
    }

    // ========================================================================
    // Reads (never touch the graph)
    // ========================================================================

    pub fn len(&self) -> usize {
        self.delegate.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegate.lock().is_empty()
    }

    pub fn contains(&self, entity: &Entity) -> bool {
        self.delegate.lock().contains(entity)
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> EntitySet {
        self.delegate.lock().clone()
    }

    pub fn to_vec(&self) -> Vec<Entity> {
        self.delegate.lock().to_vec()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Entity> {
        self.to_vec().into_iter()
    }

    /// Iterate with the option of removing the entity last returned.
    pub fn cursor(&self) -> ManagedSetCursor<'_> {
        ManagedSetCursor { set: self, items: self.to_vec(), pos: 0 }
    }

    // ========================================================================
    // Mutations (written through)
    // ========================================================================

    pub fn add(&self, entity: Entity) -> Result<bool> {
        self.mutate(|set| set.insert(entity))
    }

    pub fn remove(&self, entity: &Entity) -> Result<bool> {
        self.mutate(|set| set.remove(entity))
    }

    pub fn add_all(&self, entities: impl IntoIterator<Item = Entity>) -> Result<bool> {
        self.mutate(|set| entities.into_iter().fold(false, |changed, e| set.insert(e) | changed))
    }

    pub fn remove_all(&self, entities: &[Entity]) -> Result<bool> {
        self.mutate(|set| entities.iter().fold(false, |changed, e| set.remove(e) | changed))
    }

    /// Keep only members contained in `keep`.
    pub fn retain_all(&self, keep: &[Entity]) -> Result<bool> {
        self.retain(|e| keep.contains(e))
    }

    pub fn retain(&self, mut keep: impl FnMut(&Entity) -> bool) -> Result<bool> {
        self.mutate(|set| {
            let before = set.len();
            set.retain(|e| keep(e));
            set.len() != before
        })
    }

    pub fn clear(&self) -> Result<bool> {
        self.mutate(|set| {
            let changed = !set.is_empty();
            set.clear();
            changed
        })
    }

    fn mutate(&self, change: impl FnOnce(&mut EntitySet) -> bool) -> Result<bool> {
        let previous = {
            let mut contents = self.delegate.lock();
            let previous = contents.clone();
            if !change(&mut contents) {
                return Ok(false);
            }
            previous
        };
        if let Err(e) = self.write_through() {
            *self.delegate.lock() = previous;
            return Err(e);
        }
        Ok(true)
    }

    fn write_through(&self) -> Result<()> {
        let owner = self.owner().ok_or_else(|| {
            Error::IllegalUsage(format!("owner of managed set '{}' no longer exists", self.field))
        })?;
        let written = owner.set(&self.field, FieldValue::Managed(self.clone()))?;
        match written {
            FieldValue::Managed(m) if Arc::ptr_eq(&m.delegate, &self.delegate) => {}
            other => {
                if let Some(contents) = other.entities() {
                    *self.delegate.lock() = contents;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ManagedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedSet")
            .field("field", &self.field)
            .field("contents", &*self.delegate.lock())
            .finish()
    }
}

/// Iterator over a [`ManagedSet`] snapshot that can remove the current item
/// from the live set.
pub struct ManagedSetCursor<'a> {
    set: &'a ManagedSet,
    items: Vec<Entity>,
    pos: usize,
}

impl ManagedSetCursor<'_> {
    /// Remove the entity last returned by `next`.
    pub fn remove_current(&mut self) -> Result<bool> {
        let current = self
            .pos
            .checked_sub(1)
            .and_then(|i| self.items.get(i))
            .ok_or_else(|| Error::IllegalUsage("remove_current called before next".into()))?;
        self.set.remove(current)
    }
}

impl Iterator for ManagedSetCursor<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        let item = self.items.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }
}
