use crate::errors::ModelError;
use crate::tree::GRAVEYARD;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "quire.model.json";

/// Document model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// Name of the root created with every document
    #[serde(default = "default_root_name")]
    pub default_root_name: String,

    /// Element name of that root
    #[serde(default = "default_root_element_name")]
    pub root_element_name: String,

    /// Undo levels kept by an undo stack (0 = unlimited)
    #[serde(default = "default_undo_max_levels")]
    pub undo_max_levels: usize,
}

fn default_root_name() -> String {
    "main".to_string()
}

fn default_root_element_name() -> String {
    "$root".to_string()
}

fn default_undo_max_levels() -> usize {
    100
}

impl ModelConfig {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let config: ModelConfig =
            serde_json::from_str(json).map_err(|e| ModelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `quire.model.json` from a directory, falling back to defaults
    /// when there is none.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = dir.as_ref().join(DEFAULT_CONFIG_NAME);
        if !path.exists() {
            return Ok(ModelConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ModelError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.default_root_name.is_empty() || self.default_root_name == GRAVEYARD {
            return Err(ModelError::Config(format!(
                "defaultRootName cannot be {:?}",
                self.default_root_name
            )));
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_root_name: default_root_name(),
            root_element_name: default_root_element_name(),
            undo_max_levels: default_undo_max_levels(),
        }
    }
}
