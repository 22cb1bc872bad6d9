//! Error types for the HMR core.
//!
//! Only I/O and link resolution failures are raised. Malformed component
//! sources are reported as [`ParseError`] values next to the descriptor, and a
//! live module that cannot be found during classification is handled by
//! falling back to the main module.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Errors propagated to the host for the file being processed.
#[derive(Debug, thiserror::Error)]
pub enum HmrError {
    /// The component file (or an updated copy of it) could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A block `src` reference, or a request pointing at one, has no owner.
    #[error("cannot resolve `{src}` referenced from {importer}")]
    LinkResolution { src: String, importer: String },

    /// Host supplied options that do not deserialize.
    #[error("invalid plugin options: {0}")]
    InvalidOptions(#[from] serde_json::Error),

    /// A source map handed to the stitcher is malformed.
    #[error("invalid source map: {reason}")]
    SourceMap { reason: String },
}

pub type Result<T> = std::result::Result<T, HmrError>;

/// A malformed component source, located at the offending tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct ParseError {
    pub message: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    pub fn new(message: impl Into<String>, file: &str, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            file: file.to_string(),
            line,
            column,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}: {}", self.file, self.line, self.column, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_resolution_display() {
        let err = HmrError::LinkResolution {
            src: "./missing.css".to_string(),
            importer: "/app/src/App.vue".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("./missing.css"));
        assert!(msg.contains("App.vue"));
    }

    #[test]
    fn parse_error_display_has_location() {
        let err = ParseError::new("Element is missing end tag.", "App.vue", 3, 1);
        assert_eq!(err.to_string(), "App.vue:3:1: Element is missing end tag.");
    }
}
