use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// How the descriptor id is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentIdStrategy {
    /// Path only in development, path + source in production.
    #[default]
    Auto,
    Filepath,
    FilepathSource,
}

/// Build session options shared by the cache and the update classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginOptions {
    /// Project root; ids hash the path relative to it.
    pub root: PathBuf,
    pub is_production: bool,
    pub source_map: bool,
    /// Extensions (without the dot) handled as component files. Other files
    /// reaching the classifier keep their descriptor after an update.
    pub extensions: Vec<String>,
    /// Further extensions compiled as components but not owned by this
    /// plugin (markdown pages and the like).
    pub include_extensions: Vec<String>,
    /// Styles are inlined into the component (custom element builds).
    pub custom_element: bool,
    pub component_id: ComponentIdStrategy,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            is_production: false,
            source_map: true,
            extensions: vec!["vue".to_string()],
            include_extensions: Vec::new(),
            custom_element: false,
            component_id: ComponentIdStrategy::Auto,
        }
    }
}

impl PluginOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// True when the source text takes part in the component id.
    pub fn hash_source(&self) -> bool {
        match self.component_id {
            ComponentIdStrategy::Auto => self.is_production,
            ComponentIdStrategy::Filepath => false,
            ComponentIdStrategy::FilepathSource => true,
        }
    }

    pub fn is_component_file(&self, file: &Path) -> bool {
        has_extension(file, &self.extensions)
    }

    /// The classifier handles updates for this file.
    pub fn handles_file(&self, file: &Path) -> bool {
        self.is_component_file(file) || has_extension(file, &self.include_extensions)
    }
}

fn has_extension(file: &Path, extensions: &[String]) -> bool {
    file.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e == ext))
        .unwrap_or(false)
}
