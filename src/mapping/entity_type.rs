//! Entity type metadata.

use serde::{Deserialize, Serialize};

use super::field::FieldMeta;

/// What kind of graph element backs instances of a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Node,
    /// Relationship entity; instances are relationships of `rel_type`.
    Relationship { rel_type: String },
}

/// Immutable description of one entity type, resolved once per type by the
/// accessor registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    name: String,
    kind: EntityKind,
    fields: Vec<FieldMeta>,
    use_short_names: bool,
    indexed: bool,
    index_name: Option<String>,
}

impl EntityType {
    /// A node entity type.
    pub fn node(name: impl Into<String>) -> Self {
        Self::with_kind(name.into(), EntityKind::Node)
    }

    /// A relationship entity type backed by relationships of `rel_type`.
    pub fn relationship(name: impl Into<String>, rel_type: impl Into<String>) -> Self {
        Self::with_kind(name.into(), EntityKind::Relationship { rel_type: rel_type.into() })
    }

    fn with_kind(name: String, kind: EntityKind) -> Self {
        Self {
            name,
            kind,
            fields: Vec::new(),
            use_short_names: true,
            indexed: false,
            index_name: None,
        }
    }

    pub fn field(mut self, field: FieldMeta) -> Self {
        self.fields.push(field);
        self
    }

    /// Store properties as `Type.field` instead of `field`.
    pub fn qualified_property_names(mut self) -> Self {
        self.use_short_names = false;
        self
    }

    /// Index every property-like field of this type.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Name of the type's default index.
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn kind(&self) -> &EntityKind { &self.kind }

    pub fn is_relationship_entity(&self) -> bool {
        matches!(self.kind, EntityKind::Relationship { .. })
    }

    pub fn fields(&self) -> &[FieldMeta] { &self.fields }

    pub fn get_field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn id_field(&self) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.annotations.id)
    }

    pub fn is_indexed(&self) -> bool { self.indexed }

    /// The default index: the declared name, else the type name.
    pub fn default_index_name(&self) -> &str {
        self.index_name.as_deref().unwrap_or(&self.name)
    }

    /// Property key used on the backing element for `field`.
    pub fn property_name(&self, field: &str) -> String {
        if self.use_short_names {
            field.to_string()
        } else {
            format!("{}.{}", self.name, field)
        }
    }
}
