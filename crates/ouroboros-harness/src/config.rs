//! Harness configuration
//!
//! Loaded from YAML or JSON; every field has a default so an empty document is valid.
//!
//! ```yaml
//! palette:
//!   regular: black
//!   major: navy
//!   success: green
//!   failure: red
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Colors used when appending steps.
///
/// Colors are free-form strings; consumers decide how to render them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepPalette {
    /// Default color of a regular step
    pub regular: String,
    /// Color of the lifecycle headings ("Running test...", "Verifying assertions...")
    pub major: String,
    /// Color of the "Done" step after a successful run
    pub success: String,
    /// Color of the "Done" step after a failed run
    pub failure: String,
}

impl Default for StepPalette {
    fn default() -> Self {
        Self {
            regular: "black".to_string(),
            major: "black".to_string(),
            success: "green".to_string(),
            failure: "red".to_string(),
        }
    }
}

/// Harness configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub palette: StepPalette,
}

impl HarnessConfig {
    /// Parse from YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Parse from JSON text
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a file, picking the format from the extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml_str(&text),
            "json" => Self::from_json_str(&text),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Set the palette
    pub fn with_palette(mut self, palette: StepPalette) -> Self {
        self.palette = palette;
        self
    }
}
