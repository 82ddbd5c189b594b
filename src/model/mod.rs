//! # Property Graph Model
//!
//! Clean DTOs for the property graph the mapping layer writes into.
//! These types cross the store boundary: storage ↔ field accessors ↔ user.
//!
//! Design rule: this module is pure data with no I/O and no entities.

pub mod node;
pub mod relationship;
pub mod path;
pub mod value;
pub mod property_map;
pub mod element;

pub use node::{Node, NodeId};
pub use relationship::{Relationship, RelId, Direction};
pub use path::Path;
pub use value::Value;
pub use property_map::{properties, PropertyMap};
pub use element::GraphElement;
