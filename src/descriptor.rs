//! Descriptor data model.
//!
//! A [`Descriptor`] is the structural parse of one component file at one
//! point in time. Descriptors are never mutated once the cache has stamped
//! them; an edit produces a new one and the old one becomes the diff
//! baseline.

#[cfg(feature = "napi")]
use napi_derive::napi;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ParseError;
use crate::script::{is_import_used, ImportBinding};

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Attribute value of a block tag. Bare attributes (`<style scoped>`) are flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Str(String),
    Flag,
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            AttrValue::Flag => None,
        }
    }
}

impl Serialize for AttrValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttrValue::Str(s) => serializer.serialize_str(s),
            AttrValue::Flag => serializer.serialize_bool(true),
        }
    }
}

/// Attributes in source order.
pub type Attrs = IndexMap<String, AttrValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockKind {
    Script,
    ScriptSetup,
    Template,
    Style,
    Custom(String),
}

impl BlockKind {
    /// Value of the `type=` query parameter for this kind.
    pub fn query_type(&self) -> &str {
        match self {
            BlockKind::Script | BlockKind::ScriptSetup => "script",
            BlockKind::Template => "template",
            BlockKind::Style => "style",
            BlockKind::Custom(ty) => ty,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub kind: BlockKind,
    pub content: String,
    pub attrs: Attrs,
    pub lang: Option<String>,
    pub src: Option<String>,
    /// Style only.
    pub scoped: bool,
    /// Style only: CSS modules.
    pub module: bool,
    pub loc: SourceLocation,
}

impl Block {
    /// Build a block, deriving `lang`, `src`, `scoped` and `module` from the
    /// attribute map.
    pub fn new(kind: BlockKind, content: impl Into<String>, attrs: Attrs, loc: SourceLocation) -> Self {
        let string_attr = |name: &str| {
            attrs
                .get(name)
                .and_then(AttrValue::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let lang = string_attr("lang");
        let src = string_attr("src");
        let is_style = kind == BlockKind::Style;
        let scoped = is_style && attrs.contains_key("scoped");
        let module = is_style && attrs.contains_key("module");

        Self {
            kind,
            content: content.into(),
            lang,
            src,
            scoped,
            module,
            attrs,
            loc,
        }
    }

    /// Type tag of a custom block, `None` for the built-in kinds.
    pub fn custom_type(&self) -> Option<&str> {
        match &self.kind {
            BlockKind::Custom(ty) => Some(ty),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FORCE RELOAD RULE
// ═══════════════════════════════════════════════════════════════════════════════

/// Decides whether a markup-only edit still requires the behavior block to be
/// recompiled, given the imports resolved from the previous revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ForceReloadRule {
    #[default]
    Never,
    /// The setup block is TypeScript, whose compiler elides imports the markup
    /// does not use. Reload when an import's usage flips.
    ImportUsage,
}

impl ForceReloadRule {
    pub fn for_setup(setup: Option<&Block>) -> Self {
        match setup.and_then(|b| b.lang.as_deref()) {
            Some("ts") | Some("tsx") => ForceReloadRule::ImportUsage,
            _ => ForceReloadRule::Never,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DESCRIPTOR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub id: String,
    pub filename: PathBuf,
    #[serde(skip)]
    pub source: String,
    pub script: Option<Block>,
    pub script_setup: Option<Block>,
    pub template: Option<Block>,
    pub styles: Vec<Block>,
    pub custom_blocks: Vec<Block>,
    pub css_vars: Vec<String>,
    pub force_reload: ForceReloadRule,
    /// Session-unique stamp assigned by the cache.
    pub revision: u64,
}

impl Descriptor {
    pub fn new(filename: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            filename: filename.into(),
            source: source.into(),
            script: None,
            script_setup: None,
            template: None,
            styles: Vec::new(),
            custom_blocks: Vec::new(),
            css_vars: Vec::new(),
            force_reload: ForceReloadRule::Never,
            revision: 0,
        }
    }

    /// True if any style block is scoped.
    pub fn scoped(&self) -> bool {
        self.styles.iter().any(|s| s.scoped)
    }

    pub fn should_force_reload(&self, prev_imports: &BTreeMap<String, ImportBinding>) -> bool {
        match self.force_reload {
            ForceReloadRule::Never => false,
            ForceReloadRule::ImportUsage => prev_imports
                .iter()
                .any(|(local, binding)| binding.is_used_in_markup != is_import_used(local, self)),
        }
    }

    /// Every block in document-independent order: scripts, template, styles,
    /// custom blocks.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.script
            .iter()
            .chain(self.script_setup.iter())
            .chain(self.template.iter())
            .chain(self.styles.iter())
            .chain(self.custom_blocks.iter())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER SEAM
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ParseOptions<'a> {
    pub filename: &'a Path,
    pub source_map: bool,
}

pub struct ParseOutput {
    pub descriptor: Descriptor,
    pub errors: Vec<ParseError>,
}

/// Splits a component source into blocks. The id and revision of the returned
/// descriptor are left for the cache to stamp.
pub trait ComponentParser: Send + Sync {
    fn parse(&self, source: &str, options: &ParseOptions<'_>) -> ParseOutput;
}
