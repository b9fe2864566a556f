//! Pipeline settings

use crate::core::error::BuildError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings applied when a pipeline is assembled
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Pipeline name, shown in logs
    #[serde(default = "default_name")]
    pub name: String,

    /// Log entry and exit of every stage at debug level
    #[serde(default = "default_trace_stages")]
    pub trace_stages: bool,
}

fn default_name() -> String {
    "pipeline".to_string()
}

fn default_trace_stages() -> bool {
    true
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            trace_stages: default_trace_stages(),
        }
    }
}

impl PipelineSettings {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BuildError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, BuildError> {
        let settings: PipelineSettings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.name.trim().is_empty() {
            return Err(BuildError::InvalidSettings(
                "pipeline name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
