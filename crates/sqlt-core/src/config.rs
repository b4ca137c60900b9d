//! Installer-facing configuration for the template processor.
//!
//! Keys are spelled exactly as installers set them. Callable context addons
//! and custom backend processors cannot be expressed in YAML and are
//! registered programmatically when the runtime is built.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Template processing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateConfig {
    /// Feature gate; when false templates are returned unchanged
    #[serde(rename = "ENABLE_TEMPLATE_PROCESSING", default = "default_true")]
    pub enable_template_processing: bool,

    /// Fallback for `current_user_locale()`
    #[serde(rename = "BABEL_DEFAULT_LOCALE", default = "default_locale")]
    pub babel_default_locale: String,

    /// Locales accepted from Accept-Language; empty accepts any
    #[serde(rename = "LANGUAGES", default)]
    pub languages: Vec<String>,

    /// Data values merged into the base namespace
    #[serde(rename = "JINJA_CONTEXT_ADDONS", default)]
    pub jinja_context_addons: BTreeMap<String, serde_json::Value>,

    /// Optional instruction budget for a single render
    #[serde(rename = "TEMPLATE_FUEL", default)]
    pub template_fuel: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_locale() -> String {
    "en".to_string()
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            enable_template_processing: true,
            babel_default_locale: default_locale(),
            languages: Vec::new(),
            jinja_context_addons: BTreeMap::new(),
            template_fuel: None,
        }
    }
}

impl TemplateConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::IoWithPath {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(content: &str) -> CoreResult<Self> {
        let config: TemplateConfig =
            serde_yaml::from_str(content).map_err(|e| CoreError::ConfigParseError {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the constraints serde cannot express
    pub fn validate(&self) -> CoreResult<()> {
        if self.babel_default_locale.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "BABEL_DEFAULT_LOCALE must not be empty".to_string(),
            });
        }
        if let Some(name) = self
            .jinja_context_addons
            .keys()
            .find(|name| !is_identifier(name))
        {
            return Err(CoreError::ConfigInvalid {
                message: format!("JINJA_CONTEXT_ADDONS key '{name}' is not a valid identifier"),
            });
        }
        if self.template_fuel == Some(0) {
            return Err(CoreError::ConfigInvalid {
                message: "TEMPLATE_FUEL must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Template-visible names: ASCII identifiers not starting with `_`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
