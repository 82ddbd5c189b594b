//! Mapping configuration.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Container-level settings shared by every entity type of one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OgmConfig {
    /// Index every property-like field, whether or not it is marked indexed.
    pub index_all_properties: bool,
    /// Property carrying the entity type name on created nodes.
    pub type_property: String,
    /// Label created nodes with their entity type name.
    pub label_nodes: bool,
    /// Depth cap for traversals declared without a maximum depth.
    pub max_traversal_depth: usize,
}

impl Default for OgmConfig {
    fn default() -> Self {
        Self {
            index_all_properties: false,
            type_property: "__type__".to_string(),
            label_nodes: true,
            max_traversal_depth: 100,
        }
    }
}

impl OgmConfig {
    /// Parse a JSON document; absent keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid mapping configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.type_property.is_empty() {
            return Err(Error::Configuration("type_property must not be empty".into()));
        }
        if self.max_traversal_depth == 0 {
            return Err(Error::Configuration("max_traversal_depth must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = OgmConfig::from_json(r#"{"index_all_properties": true}"#).unwrap();
        assert!(config.index_all_properties);
        assert_eq!(config.type_property, "__type__");
        assert_eq!(config.max_traversal_depth, 100);
    }

    #[test]
    fn test_invalid_json_is_configuration_error() {
        assert!(matches!(OgmConfig::from_json("{"), Err(Error::Configuration(_))));
        assert!(matches!(
            OgmConfig::from_json(r#"{"max_traversal_depth": 0}"#),
            Err(Error::Configuration(_))
        ));
    }
}
