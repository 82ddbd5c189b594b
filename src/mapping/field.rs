//! Field metadata: declared type plus mapping annotations.

use serde::{Deserialize, Serialize};

use crate::index::IndexType;
use crate::model::{Direction, Value};

/// Scalar kinds a property field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Char,
    String,
}

impl ScalarKind {
    /// Zero value used for primitive fields with no stored property.
    pub fn zero(self) -> Value {
        match self {
            ScalarKind::Bool => Value::Bool(false),
            ScalarKind::Int => Value::Int(0),
            ScalarKind::Float => Value::Float(0.0),
            ScalarKind::Char => Value::String("\0".to_string()),
            ScalarKind::String => Value::String(String::new()),
        }
    }

    /// Whether `value` already has this kind at runtime.
    pub fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (ScalarKind::Bool, Value::Bool(_)) => true,
            (ScalarKind::Int, Value::Int(_)) => true,
            (ScalarKind::Float, Value::Float(_)) => true,
            (ScalarKind::Char, Value::String(s)) => s.chars().count() == 1,
            (ScalarKind::String, Value::String(_)) => true,
            _ => false,
        }
    }
}

/// Declared type of an entity field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldType {
    /// Non-nullable scalar; reads of a missing property yield the zero value.
    Primitive(ScalarKind),
    /// Nullable scalar.
    Boxed(ScalarKind),
    /// One-dimensional array of scalars.
    Array(ScalarKind),
    /// Calendar date, stored as an ISO-8601 string.
    Date,
    /// UTC timestamp, stored as epoch milliseconds.
    DateTime,
    /// Enumeration stored by variant name.
    Enum(Vec<String>),
    /// Single reference to a node entity of the named type.
    Reference(String),
    /// Set of references to node entities of the named type.
    ReferenceSet(String),
    /// Set of relationship entities of the named type.
    RelationshipEntitySet(String),
    /// Free-form map stored as prefixed properties.
    DynamicProperties,
    /// A type no accessor handles; the field stays unmanaged.
    Unmapped(String),
}

impl FieldType {
    pub fn is_primitive(&self) -> bool {
        matches!(self, FieldType::Primitive(_))
    }

    /// Whether values of this type live in a property of the backing element.
    pub fn is_property_like(&self) -> bool {
        matches!(
            self,
            FieldType::Primitive(_)
                | FieldType::Boxed(_)
                | FieldType::Array(_)
                | FieldType::Date
                | FieldType::DateTime
                | FieldType::Enum(_)
        )
    }

    /// Name of the referenced entity type for relationship-shaped fields.
    pub fn target_type(&self) -> Option<&str> {
        match self {
            FieldType::Reference(t)
            | FieldType::ReferenceSet(t)
            | FieldType::RelationshipEntitySet(t) => Some(t),
            _ => None,
        }
    }

    /// Default value of an unset field: zero for primitives, null otherwise.
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::Primitive(kind) => kind.zero(),
            _ => Value::Null,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FieldType::Primitive(k) => format!("{k:?}").to_lowercase(),
            FieldType::Boxed(k) => format!("{k:?}"),
            FieldType::Array(k) => format!("[{k:?}]"),
            FieldType::Date => "Date".into(),
            FieldType::DateTime => "DateTime".into(),
            FieldType::Enum(_) => "Enum".into(),
            FieldType::Reference(t) => t.clone(),
            FieldType::ReferenceSet(t) => format!("Set<{t}>"),
            FieldType::RelationshipEntitySet(t) => format!("Set<{t}>"),
            FieldType::DynamicProperties => "DynamicProperties".into(),
            FieldType::Unmapped(t) => t.clone(),
        }
    }
}

/// Relationship type and direction of a relationship-shaped field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedTo {
    pub rel_type: String,
    pub direction: Direction,
}

impl RelatedTo {
    pub fn new(rel_type: impl Into<String>, direction: Direction) -> Self {
        Self { rel_type: rel_type.into(), direction }
    }
}

/// Index declaration of a property field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Indexed {
    /// Explicit index name; the entity type's default index when absent.
    pub index_name: Option<String>,
    pub index_type: IndexType,
}

/// Statically configured traversal backing a computed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalDescription {
    /// Relationship types to follow; empty means all.
    pub rel_types: Vec<String>,
    pub direction: Direction,
    pub min_depth: usize,
    /// `None` is capped by the context's `max_traversal_depth`.
    pub max_depth: Option<usize>,
}

impl TraversalDescription {
    pub fn new(direction: Direction) -> Self {
        Self { rel_types: Vec::new(), direction, min_depth: 1, max_depth: None }
    }

    pub fn relationship(mut self, rel_type: impl Into<String>) -> Self {
        self.rel_types.push(rel_type.into());
        self
    }

    pub fn depth(mut self, min: usize, max: usize) -> Self {
        self.min_depth = min;
        self.max_depth = Some(max);
        self
    }
}

/// Mapping annotations of one field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldAnnotations {
    pub id: bool,
    pub transient: bool,
    pub read_only: bool,
    pub indexed: Option<Indexed>,
    pub related_to: Option<RelatedTo>,
    pub related_to_via: Option<RelatedTo>,
    pub graph_traversal: Option<TraversalDescription>,
    pub start_node: bool,
    pub end_node: bool,
}

/// One declared field of an entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    pub field_type: FieldType,
    pub annotations: FieldAnnotations,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self { name: name.into(), field_type, annotations: FieldAnnotations::default() }
    }

    /// Store-assigned identity field.
    pub fn id(mut self) -> Self {
        self.annotations.id = true;
        self
    }

    pub fn transient(mut self) -> Self {
        self.annotations.transient = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.annotations.read_only = true;
        self
    }

    /// Index in the entity type's default index.
    pub fn indexed(mut self) -> Self {
        self.annotations.indexed = Some(Indexed::default());
        self
    }

    /// Index in a named exact index.
    pub fn indexed_in(mut self, index_name: impl Into<String>) -> Self {
        self.annotations.indexed = Some(Indexed {
            index_name: Some(index_name.into()),
            index_type: IndexType::Exact,
        });
        self
    }

    /// Index in a full-text index. Needs an explicit, non-default name.
    pub fn fulltext(mut self, index_name: Option<&str>) -> Self {
        self.annotations.indexed = Some(Indexed {
            index_name: index_name.map(str::to_string),
            index_type: IndexType::FullText,
        });
        self
    }

    pub fn related_to(mut self, rel_type: impl Into<String>, direction: Direction) -> Self {
        self.annotations.related_to = Some(RelatedTo::new(rel_type, direction));
        self
    }

    pub fn related_to_via(mut self, rel_type: impl Into<String>, direction: Direction) -> Self {
        self.annotations.related_to_via = Some(RelatedTo::new(rel_type, direction));
        self
    }

    pub fn traversal(mut self, description: TraversalDescription) -> Self {
        self.annotations.graph_traversal = Some(description);
        self
    }

    pub fn start_node(mut self) -> Self {
        self.annotations.start_node = true;
        self
    }

    pub fn end_node(mut self) -> Self {
        self.annotations.end_node = true;
        self
    }

    /// Relationship type/direction of a reference field. Falls back to the
    /// field name, outgoing.
    pub fn relationship(&self) -> RelatedTo {
        self.annotations
            .related_to
            .clone()
            .or_else(|| self.annotations.related_to_via.clone())
            .unwrap_or_else(|| RelatedTo::new(self.name.clone(), Direction::Outgoing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_defaults() {
        assert_eq!(FieldType::Primitive(ScalarKind::Int).default_value(), Value::Int(0));
        assert_eq!(FieldType::Primitive(ScalarKind::Bool).default_value(), Value::Bool(false));
        assert_eq!(FieldType::Boxed(ScalarKind::Int).default_value(), Value::Null);
    }

    #[test]
    fn test_relationship_falls_back_to_field_name() {
        let field = FieldMeta::new("friends", FieldType::ReferenceSet("Person".into()));
        assert_eq!(field.relationship(), RelatedTo::new("friends", Direction::Outgoing));

        let field = field.related_to("KNOWS", Direction::Incoming);
        assert_eq!(field.relationship(), RelatedTo::new("KNOWS", Direction::Incoming));
    }

    #[test]
    fn test_char_matching() {
        assert!(ScalarKind::Char.matches(&Value::from('x')));
        assert!(!ScalarKind::Char.matches(&Value::from("xy")));
    }
}
