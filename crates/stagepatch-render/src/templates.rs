//! Template loading for inserted manifest text.
//!
//! Same YAML layout as any other named-template file: a version and a map
//! of templates, each with a description and a handlebars body.

use crate::RenderError;
use serde::Deserialize;
use std::collections::HashMap;

const BUILTIN_TEMPLATES: &str = include_str!("../templates/stage-templates.yaml");

/// Top-level templates file structure
#[derive(Debug, Clone, Deserialize)]
pub struct TemplatesFile {
    pub version: String,
    pub templates: HashMap<String, Template>,
}

/// A single template definition
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub description: String,
    pub template: String,
}

impl TemplatesFile {
    /// Templates compiled into the crate
    pub fn builtin() -> Result<Self, RenderError> {
        Self::from_yaml(BUILTIN_TEMPLATES)
    }

    /// Load templates from a YAML file
    pub fn load(path: &str) -> Result<Self, RenderError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RenderError::Template(format!("Failed to read templates file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse templates from YAML content
    pub fn from_yaml(yaml: &str) -> Result<Self, RenderError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RenderError::Template(format!("Failed to parse templates YAML: {}", e)))
    }

    /// Replace one template body, keeping the rest
    pub fn with_template(mut self, name: &str, body: &str) -> Self {
        self.templates.insert(
            name.to_string(),
            Template { description: format!("{} override", name), template: body.to_string() },
        );
        self
    }
}
