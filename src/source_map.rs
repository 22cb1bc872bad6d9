//! Source map stitching.
//!
//! The script and the markup of a component are compiled separately and
//! concatenated, script first. Their maps are merged by shifting every markup
//! mapping down past the script output.

#[cfg(feature = "napi")]
use napi_derive::napi;
use sourcemap::{SourceMap, SourceMapBuilder};

use crate::error::{HmrError, Result};

/// Lines the markup output is shifted by when appended after `script_code`.
pub fn line_offset(script_code: &str) -> u32 {
    script_code.matches('\n').count() as u32 + 1
}

/// Merge the script map with the markup map that follows `script_code` in
/// the final output. Source contents are taken from the markup map.
pub fn merge_source_maps(
    script_map: Option<&SourceMap>,
    template_map: Option<&SourceMap>,
    script_code: &str,
) -> SourceMap {
    let (script_map, template_map) = match (script_map, template_map) {
        (Some(s), Some(t)) => (s, t),
        (Some(only), None) | (None, Some(only)) => return only.clone(),
        (None, None) => return SourceMapBuilder::new(None).into_sourcemap(),
    };

    let mut builder = SourceMapBuilder::new(script_map.get_file());
    let script_sources: Vec<u32> = script_map.sources().map(|s| builder.add_source(s)).collect();
    let script_names: Vec<u32> = script_map.names().map(|n| builder.add_name(n)).collect();
    for token in script_map.tokens() {
        let source = token
            .has_source()
            .then(|| script_sources.get(token.get_src_id() as usize).copied())
            .flatten();
        let name = token
            .has_name()
            .then(|| script_names.get(token.get_name_id() as usize).copied())
            .flatten();
        builder.add_raw(
            token.get_dst_line(),
            token.get_dst_col(),
            token.get_src_line(),
            token.get_src_col(),
            source,
            name,
            false,
        );
    }

    let mut template_sources = Vec::new();
    for (idx, source) in template_map.sources().enumerate() {
        let id = builder.add_source(source);
        if let Some(content) = template_map.get_source_contents(idx as u32) {
            builder.set_source_contents(id, Some(content));
        }
        template_sources.push(id);
    }
    let template_names: Vec<u32> = template_map.names().map(|n| builder.add_name(n)).collect();

    let offset = line_offset(script_code);
    for token in template_map.tokens() {
        if !token.has_source() {
            continue;
        }
        let Some(source) = template_sources.get(token.get_src_id() as usize).copied() else {
            continue;
        };
        let name = token
            .has_name()
            .then(|| template_names.get(token.get_name_id() as usize).copied())
            .flatten();
        builder.add_raw(
            token.get_dst_line() + offset,
            token.get_dst_col(),
            token.get_src_line(),
            token.get_src_col(),
            Some(source),
            name,
            false,
        );
    }

    builder.into_sourcemap()
}

/// [`merge_source_maps`] over serialised maps.
pub fn merge_source_map_json(
    script_map: Option<&str>,
    template_map: Option<&str>,
    script_code: &str,
) -> Result<String> {
    let parse = |json: Option<&str>| {
        json.map(|j| SourceMap::from_slice(j.as_bytes()))
            .transpose()
            .map_err(|e| HmrError::SourceMap { reason: e.to_string() })
    };
    let script = parse(script_map)?;
    let template = parse(template_map)?;
    let merged = merge_source_maps(script.as_ref(), template.as_ref(), script_code);

    let mut bytes = Vec::new();
    merged
        .to_writer(&mut bytes)
        .map_err(|e| HmrError::SourceMap { reason: e.to_string() })?;
    String::from_utf8(bytes).map_err(|e| HmrError::SourceMap { reason: e.to_string() })
}

#[cfg(feature = "napi")]
#[napi]
pub fn merge_source_maps_native(
    script_map: Option<String>,
    template_map: Option<String>,
    script_code: String,
) -> napi::Result<String> {
    merge_source_map_json(script_map.as_deref(), template_map.as_deref(), &script_code)
        .map_err(|e| napi::Error::from_reason(e.to_string()))
}
