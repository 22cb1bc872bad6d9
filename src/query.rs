//! Virtual module addresses.
//!
//! Every sub-block the compiler emits as its own module gets an address of
//! the form
//!
//! ```text
//! <path-or-src>?vue&type=<kind>[&index=<i>][&src=<marker>][&scoped=<id>][&inline]<attrs>&lang.<lang>
//! ```
//!
//! The update classifier finds live modules by matching fragments of these
//! addresses, so encoding and decoding both live here.

#[cfg(feature = "napi")]
use napi_derive::napi;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::descriptor::{AttrValue, Attrs, Block, Descriptor};
use crate::options::PluginOptions;

/// Attributes that are already encoded elsewhere in the address.
pub const IGNORED_ATTRS: &[&str] = &["id", "index", "src", "type", "lang", "module", "scoped", "generic"];

lazy_static! {
    static ref TYPE_QUERY_RE: Regex = Regex::new(r"[?&]type=").unwrap();
    static ref SCRIPT_TYPE_RE: Regex = Regex::new(r"[?&]type=script(?:&|$)").unwrap();
    static ref SCRIPT_MODULE_RE: Regex = Regex::new(r"type=script.*&lang\.\w+$").unwrap();
    static ref TEMPLATE_TYPE_RE: Regex = Regex::new(r"[?&]type=template(?:&|$)").unwrap();
    static ref DIRECT_REQUEST_RE: Regex = Regex::new(r"(?:\?|&)direct\b").unwrap();
    static ref CSS_REQUEST_RE: Regex =
        Regex::new(r"\.(css|less|sass|scss|styl|stylus|pcss|postcss|sss)(?:$|\?)").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENCODING
// ═══════════════════════════════════════════════════════════════════════════════

/// Serialise block attributes into query parameters, ending with the
/// language suffix. With `force_fallback` the fallback wins over a declared
/// `lang`.
pub fn attrs_to_query(attrs: &Attrs, lang_fallback: Option<&str>, force_fallback: bool) -> String {
    let mut query = String::new();
    for (name, value) in attrs {
        if IGNORED_ATTRS.contains(&name.as_str()) {
            continue;
        }
        query.push('&');
        query.push_str(&urlencoding::encode(name));
        if let AttrValue::Str(v) = value {
            if !v.is_empty() {
                query.push('=');
                query.push_str(&urlencoding::encode(v));
            }
        }
    }

    let declared = attrs.get("lang").and_then(AttrValue::as_str).filter(|l| !l.is_empty());
    let lang = match (declared, lang_fallback) {
        (Some(_), Some(fallback)) if force_fallback => Some(fallback),
        (Some(declared), _) => Some(declared),
        (None, fallback) => fallback,
    };
    if let Some(lang) = lang {
        query.push_str("&lang.");
        query.push_str(lang);
    }
    query
}

fn block_path(descriptor: &Descriptor, block: &Block) -> String {
    match &block.src {
        Some(src) => src.clone(),
        None => descriptor.filename.to_string_lossy().into_owned(),
    }
}

/// `src` marker of a linked block: the owner id when the block is scoped,
/// `true` otherwise. Matches the cache's link key.
fn src_query(block: &Block, scoped: bool, id: &str) -> String {
    match (&block.src, scoped) {
        (None, _) => String::new(),
        (Some(_), true) => format!("&src={}", id),
        (Some(_), false) => "&src=true".to_string(),
    }
}

/// Address of the behavior block when it is emitted as its own module.
pub fn script_request(descriptor: &Descriptor) -> Option<String> {
    let block = descriptor.script.as_ref().or(descriptor.script_setup.as_ref())?;
    let src = block_path(descriptor, block);
    let fallback = block
        .src
        .as_ref()
        .and_then(|s| Path::new(s).extension())
        .and_then(|ext| ext.to_str())
        .unwrap_or("js");
    Some(format!(
        "{}?vue&type=script{}{}",
        src,
        src_query(block, false, &descriptor.id),
        attrs_to_query(&block.attrs, Some(fallback), false)
    ))
}

pub fn template_request(descriptor: &Descriptor) -> Option<String> {
    let block = descriptor.template.as_ref()?;
    let scoped = descriptor.scoped();
    let scoped_query = if scoped {
        format!("&scoped={}", descriptor.id)
    } else {
        String::new()
    };
    Some(format!(
        "{}?vue&type=template{}{}{}",
        block_path(descriptor, block),
        src_query(block, scoped, &descriptor.id),
        scoped_query,
        attrs_to_query(&block.attrs, Some("js"), true)
    ))
}

/// Address of style block `index`. CSS modules are materialised as
/// `.module.<lang>`; `inline` marks styles compiled into the main module.
pub fn style_request(descriptor: &Descriptor, index: usize, inline: bool) -> Option<String> {
    let block = descriptor.styles.get(index)?;
    let scoped_query = if block.scoped {
        format!("&scoped={}", descriptor.id)
    } else {
        String::new()
    };
    let attrs_query = if block.module {
        let lang = format!("module.{}", block.lang.as_deref().unwrap_or("css"));
        attrs_to_query(&block.attrs, Some(&lang), true)
    } else {
        attrs_to_query(&block.attrs, Some("css"), false)
    };
    Some(format!(
        "{}?vue&type=style&index={}{}{}{}{}",
        block_path(descriptor, block),
        index,
        src_query(block, block.scoped, &descriptor.id),
        scoped_query,
        if inline { "&inline" } else { "" },
        attrs_query
    ))
}

/// Addresses of every style block, in order. Custom element builds compile
/// styles into the main module, so their addresses carry `&inline`.
pub fn style_requests(descriptor: &Descriptor, options: &PluginOptions) -> Vec<String> {
    (0..descriptor.styles.len())
        .filter_map(|i| style_request(descriptor, i, options.custom_element))
        .collect()
}

pub fn custom_block_request(descriptor: &Descriptor, index: usize) -> Option<String> {
    let block = descriptor.custom_blocks.get(index)?;
    let ty = block.custom_type()?;
    Some(format!(
        "{}?vue&type={}&index={}{}{}",
        block_path(descriptor, block),
        urlencoding::encode(ty),
        index,
        src_query(block, false, &descriptor.id),
        attrs_to_query(&block.attrs, Some(ty), false)
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECODING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum SrcMarker {
    /// `src=true`: an unscoped linked block.
    Linked,
    /// `src=<id>`: a scoped block owned by the descriptor with this id.
    Owner(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockQuery {
    pub vue: bool,
    /// Value of `type=`.
    pub kind: Option<String>,
    pub index: Option<usize>,
    pub src: Option<SrcMarker>,
    pub scoped: Option<String>,
    pub inline: bool,
    pub raw: bool,
    pub direct: bool,
    pub lang: Option<String>,
    pub module: bool,
}

impl BlockQuery {
    /// Owner id to use for a link lookup of this request.
    pub fn scoped_owner(&self) -> Option<&str> {
        match &self.src {
            Some(SrcMarker::Owner(id)) => Some(id),
            _ => None,
        }
    }
}

/// Split a module id into its file path and decoded block query.
pub fn parse_request(id: &str) -> (PathBuf, BlockQuery) {
    let (path, raw_query) = match id.split_once('?') {
        Some((path, query)) => (path, query),
        None => (id, ""),
    };

    let mut query = BlockQuery::default();
    for pair in raw_query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, Some(decode(v))),
            None => (pair, None),
        };
        match key {
            "vue" => query.vue = true,
            "type" => query.kind = value,
            "index" => query.index = value.and_then(|v| v.parse().ok()),
            "src" => {
                query.src = Some(match value.as_deref() {
                    None | Some("") | Some("true") => SrcMarker::Linked,
                    Some(id) => SrcMarker::Owner(id.to_string()),
                })
            }
            "scoped" => query.scoped = value,
            "inline" => query.inline = true,
            "raw" => query.raw = true,
            "direct" => query.direct = true,
            "lang" => query.lang = value,
            _ => {
                if let Some(lang) = key.strip_prefix("lang.") {
                    match lang.strip_prefix("module.") {
                        Some(inner) => {
                            query.module = true;
                            query.lang = Some(inner.to_string());
                        }
                        None => query.lang = Some(lang.to_string()),
                    }
                }
            }
        }
    }

    (PathBuf::from(path), query)
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PATTERN PREDICATES
// ═══════════════════════════════════════════════════════════════════════════════

/// `needle` occurs in `url` and is not immediately followed by another digit
/// (so `index=1` does not match `index=12`).
fn contains_param_run(url: &str, needle: &str) -> bool {
    url.match_indices(needle).any(|(at, _)| {
        !url[at + needle.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit())
    })
}

pub fn has_block_type(url: &str) -> bool {
    TYPE_QUERY_RE.is_match(url)
}

/// Candidate for the module representing the whole file: no block type, or
/// the script block.
pub fn is_main_candidate(url: &str) -> bool {
    !has_block_type(url) || SCRIPT_TYPE_RE.is_match(url)
}

pub fn is_script_module(url: &str) -> bool {
    SCRIPT_MODULE_RE.is_match(url)
}

pub fn is_template_module(url: &str) -> bool {
    TEMPLATE_TYPE_RE.is_match(url)
}

pub fn is_direct_request(url: &str) -> bool {
    DIRECT_REQUEST_RE.is_match(url)
}

pub fn is_inline_request(url: &str) -> bool {
    url.contains("&inline")
}

pub fn is_css_request(url: &str) -> bool {
    CSS_REQUEST_RE.is_match(url)
}

/// Live module for style block `index` compiled as `lang`.
pub fn matches_style(url: &str, index: usize, lang: &str) -> bool {
    contains_param_run(url, &format!("type=style&index={}", index))
        && url.ends_with(&format!(".{}", lang))
        && !is_direct_request(url)
}

pub fn matches_custom(url: &str, block_type: &str, index: usize) -> bool {
    contains_param_run(
        url,
        &format!("type={}&index={}", urlencoding::encode(block_type), index),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
#[napi]
pub fn parse_request_native(id: String) -> napi::Result<serde_json::Value> {
    let (path, query) = parse_request(&id);
    let query = serde_json::to_value(query).map_err(|e| napi::Error::from_reason(e.to_string()))?;
    Ok(serde_json::json!({
        "filename": path.to_string_lossy(),
        "query": query,
    }))
}

#[cfg(feature = "napi")]
#[napi]
pub fn is_css_request_native(url: String) -> bool {
    is_css_request(&url)
}
