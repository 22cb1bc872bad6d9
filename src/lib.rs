//! # Component HMR core
//!
//! Incremental compilation state and hot-update classification for
//! single-file components: a file holding one markup block, up to two
//! behavior blocks, any number of style blocks and custom blocks.
//!
//! ## Pipeline
//!
//! 1. **Parse**: a [`ComponentParser`] splits the file into a [`Descriptor`].
//!    [`SfcParser`] is the default block splitter.
//! 2. **Cache**: the [`DescriptorCache`] keeps the compiled, analysed and
//!    previous descriptor of every file, plus links from external `src`
//!    files back to their owners.
//! 3. **Address**: every block is served as its own virtual module under an
//!    address built by [`query`]; the same module parses addresses back.
//! 4. **Diff / classify**: on an edit, [`HmrSession::hot_update`] diffs the
//!    new descriptor against the last analysed one and picks the live modules
//!    to replace. A missing expected module always falls back to the main
//!    module.
//! 5. **Source maps**: [`merge_source_maps`] stitches the script and markup
//!    maps of one component into a single map.
//!
//! ## Concurrency
//!
//! Cache entries for different files may be touched from different threads.
//! Events for the same file must be serialised by the host.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod cache;
mod descriptor;
mod diff;
mod error;
mod hmr;
mod options;
mod parse;
mod paths;
pub mod query;
mod script;
mod source_map;

#[cfg(test)]
mod hmr_tests;

pub use cache::{CompileEntry, CreatedDescriptor, DescriptorCache};
pub use descriptor::{
    AttrValue, Attrs, Block, BlockKind, ComponentParser, Descriptor, ForceReloadRule, ParseOptions,
    ParseOutput, SourceLocation,
};
pub use diff::{block_equals, diff, is_only_template_changed, script_changed, BlockListDiff, DescriptorDiff};
pub use error::{HmrError, ParseError, Result};
pub use hmr::{
    classify, main_module, script_module, template_module, Classification, HmrSession, HotUpdate,
    LiveModule, ModuleGraph, TypeDepRegistry, UpdateKind,
};
pub use options::{ComponentIdStrategy, PluginOptions};
pub use parse::{parse_css_vars, SfcParser};
pub use paths::{normalize_path, resolve_type_file};
pub use query::{parse_request, BlockQuery, SrcMarker};
pub use script::{is_import_used, markup_identifiers, ImportBinding, ImportScanner, ResolvedScript, ScriptResolver};
pub use source_map::{line_offset, merge_source_map_json, merge_source_maps};
pub use ::sourcemap::SourceMap;

#[cfg(feature = "napi")]
pub use query::{is_css_request_native, parse_request_native};
#[cfg(feature = "napi")]
pub use source_map::merge_source_maps_native;

/// Block diff of two sources of the same file, as JSON.
#[cfg(feature = "napi")]
#[napi]
pub fn diff_sources_native(filename: String, prev: String, next: String) -> napi::Result<serde_json::Value> {
    let path = std::path::Path::new(&filename);
    let options = ParseOptions {
        filename: path,
        source_map: false,
    };
    let prev = SfcParser.parse(&prev, &options).descriptor;
    let next = SfcParser.parse(&next, &options).descriptor;
    let resolved = ImportScanner.resolve(&prev);
    serde_json::to_value(diff(&prev, &next, Some(&resolved))).map_err(|e| napi::Error::from_reason(e.to_string()))
}
