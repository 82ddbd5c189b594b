//! # neo4j-ogm-rs: Object-Graph Mapping for Property Graphs
//!
//! Binds plain domain entities to nodes and relationships, tracks changes
//! made outside of transactions and reconciles them with the graph once a
//! transaction is available.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `GraphStore` is the contract between the mapping layer and storage
//! 2. **Metadata, not reflection**: every field is described once by an [`EntityType`]
//!    and resolved once per type to a [`FieldAccessor`](fieldaccess::FieldAccessor)
//! 3. **Decorated state**: [`DetachedEntityState`](state::DetachedEntityState) buffers
//!    writes around the attached [`DefaultEntityState`](state::DefaultEntityState)
//! 4. **Identity map**: one entity instance per graph element, so cyclic graphs
//!    materialize without recursion
//!
//! ## Quick Start
//!
//! ```rust
//! use neo4j_ogm::{EntityType, FieldMeta, FieldType, OgmContext, ScalarKind};
//!
//! # fn example() -> neo4j_ogm::Result<()> {
//! let ctx = OgmContext::in_memory();
//! let person = ctx.register(
//!     EntityType::node("Person")
//!         .field(FieldMeta::new("id", FieldType::Boxed(ScalarKind::Int)).id())
//!         .field(FieldMeta::new("name", FieldType::Boxed(ScalarKind::String)).indexed()),
//! );
//!
//! // Built outside of any transaction: writes are buffered.
//! let ada = ctx.new_entity(&person)?;
//! ada.set("name", "Ada")?;
//!
//! // Persisting opens a transaction, creates the node and flushes the field.
//! ctx.save(&ada)?;
//! assert_eq!(ada.get("name")?.as_str(), Some("Ada"));
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod storage;
pub mod tx;
pub mod index;
pub mod config;
pub mod convert;
pub mod mapping;
pub mod fieldaccess;
pub mod state;
pub mod entity;
pub mod context;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, Relationship, Path, Value, PropertyMap,
    NodeId, RelId, Direction, GraphElement,
};

// ============================================================================
// Re-exports: Storage and transactions
// ============================================================================

pub use storage::{GraphStore, MemoryStore, ExpandDepth};
pub use tx::{Transaction, TxMode, TxId};
pub use index::{IndexType, IndexValue, IndexQuery};

// ============================================================================
// Re-exports: Mapping
// ============================================================================

pub use config::OgmConfig;
pub use convert::{ConversionService, DefaultConversionService};
pub use mapping::{
    EntityKind, EntityType, FieldMeta, FieldType, ScalarKind,
    RelatedTo, Indexed, TraversalDescription, MappingContext,
};
pub use entity::{Entity, EntitySet, FieldValue};
pub use fieldaccess::ManagedSet;
pub use context::OgmContext;

// ============================================================================
// Error Types
// ============================================================================

/// Every failure the mapping layer can report.
///
/// Errors propagate unchanged to the caller's transaction boundary; nothing
/// in this crate retries or swallows them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Mapping metadata that cannot be resolved (conflicting annotations,
    /// unusable index names, unknown types).
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Field '{field}' of {entity_type} is read-only")]
    ReadOnlyField { entity_type: String, field: String },

    #[error("Circular reference: {0}")]
    CircularReference(String),

    #[error("Type error: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Illegal usage: {0}")]
    IllegalUsage(String),

    /// The store refused a write because no transaction is running.
    #[error("Not in a transaction")]
    NotInTransaction,

    /// Backing state could not be created or used in the current resource
    /// state (no transaction, no backing element).
    #[error("Invalid resource usage: {0}")]
    ResourceUsage(String),

    #[error("Concurrent modification of {element} field '{field}': expected {expected}, found {found}")]
    ConcurrentModification {
        element: String,
        field: String,
        expected: String,
        found: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Entity was removed: {0}")]
    EntityRemoved(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
