//! # Entity State
//!
//! An entity's state decides how field reads and writes reach the graph.
//! States compose as decorators over one trait:
//!
//! - [`DefaultEntityState`] routes every access straight to the field's
//!   accessor and creates or reattaches the backing element.
//! - [`DetachedEntityState`] wraps another state and buffers writes while
//!   no transaction is running or no backing element exists, replaying
//!   them with a lost-update check once the entity is persisted.
//!
//! ```text
//! Unbound ──create_and_assign_state──▶ Attached ──remove──▶ Removed
//!    (needs a running transaction; reattaches if the id resolves)
//! ```

pub mod default;
pub mod detached;

use crate::entity::{Entity, FieldValue};
use crate::Result;

pub use default::DefaultEntityState;
pub use detached::DetachedEntityState;

/// Field access and lifecycle of one entity instance.
///
/// The entity passes itself into every call; a state never holds a strong
/// reference back to its entity.
pub trait EntityState: Send {
    fn is_writable(&self, entity: &Entity, field: &str) -> bool;

    fn get_value(&mut self, entity: &Entity, field: &str) -> Result<FieldValue>;

    /// Write a field. The returned value becomes the in-memory value.
    fn set_value(&mut self, entity: &Entity, field: &str, new_val: FieldValue) -> Result<FieldValue>;

    /// Reject a write that the field's accessor would refuse, without
    /// touching the graph.
    fn check_value(&self, _entity: &Entity, _field: &str, _new_val: &FieldValue) -> Result<()> {
        Ok(())
    }

    /// Attach to an existing element or create one. Requires a running
    /// transaction.
    fn create_and_assign_state(&mut self, entity: &Entity) -> Result<()>;

    /// Make sure the backing element exists and holds the in-memory state.
    fn persist(&mut self, entity: &Entity) -> Result<()>;

    /// Initial in-memory value of a field, if its accessor provides one.
    fn default_implementation(&self, field: &str) -> Option<FieldValue>;

    /// Whether writes are waiting to be flushed.
    fn is_dirty(&self) -> bool {
        false
    }

    fn is_field_dirty(&self, _field: &str) -> bool {
        false
    }
}
