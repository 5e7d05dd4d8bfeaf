use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dynattr::{PanelOptions, MAX_PANEL_COLUMNS};

/// Engine configuration, read from a YAML file. Every field is optional.
///
/// ```yaml
/// extraction:
///   put_empty_row_if_no_data_selected: true
///   max_depth: 32
/// panel:
///   columns: 2
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub extraction: ExtractionConfig,
    pub panel: PanelOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionConfig {
    /// A first-level band that selected no rows still gets one empty band data, so
    /// that templates render its static content.
    pub put_empty_row_if_no_data_selected: bool,

    /// Deepest band data allowed below the root.
    pub max_depth: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            put_empty_row_if_no_data_selected: true,
            max_depth: 32,
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document is a valid, all-default configuration.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        log::debug!("Loading configuration from {}", path.display());
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.extraction.max_depth == 0 {
            return Err(ConfigError::Invalid("extraction.max_depth must be at least 1"));
        }
        if self.panel.columns == 0 {
            return Err(ConfigError::Invalid("panel.columns must be at least 1"));
        }
        if self.panel.columns > MAX_PANEL_COLUMNS {
            return Err(ConfigError::Invalid("panel.columns is above the panel limit"));
        }
        if self.panel.rows_count == Some(0) {
            return Err(ConfigError::Invalid("panel.rows_count must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error occurred while reading the configuration. {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration is not valid YAML. {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
