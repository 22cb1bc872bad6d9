//! Default component parser.
//!
//! Splits a component file into its top-level blocks without looking inside
//! them: `<script>`, `<script setup>`, `<template>`, `<style>` and any other
//! top-level tag as a custom block. Only `<template>` may nest its own tag;
//! every other block ends at the first matching close tag.

use lazy_static::lazy_static;
use regex::Regex;

use crate::descriptor::{
    AttrValue, Attrs, Block, BlockKind, ComponentParser, Descriptor, ForceReloadRule,
    ParseOptions, ParseOutput, SourceLocation,
};
use crate::error::ParseError;

lazy_static! {
    /// Opening tag anchored at the cursor.
    static ref OPEN_TAG_RE: Regex = Regex::new(r"^<([A-Za-z][\w-]*)([^>]*?)(/?)>").unwrap();

    /// Attribute regex for parsing block attributes
    static ref ATTR_RE: Regex =
        Regex::new(r#"([^\s=/>"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^>\s]+)))?"#).unwrap();

    static ref NESTED_TEMPLATE_RE: Regex =
        Regex::new(r"(?i)<template\b[^>]*?(/?)>|</template\s*>").unwrap();

    static ref CSS_COMMENT_RE: Regex = Regex::new(r"/\*[\s\S]*?\*/|//.*").unwrap();

    static ref V_BIND_RE: Regex =
        Regex::new(r#"v-bind\s*\(\s*(?:'([^']*)'|"([^"]*)"|([^)'"]*))\s*\)"#).unwrap();
}

/// Regex block splitter used when the host does not plug in its own parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SfcParser;

impl ComponentParser for SfcParser {
    fn parse(&self, source: &str, options: &ParseOptions<'_>) -> ParseOutput {
        let file = options.filename.to_string_lossy();
        let mut descriptor = Descriptor::new(options.filename, source);
        let mut errors = Vec::new();

        let mut i = 0;
        while let Some(rel) = source[i..].find('<') {
            let start = i + rel;
            let rest = &source[start..];

            if rest.starts_with("<!--") {
                match rest.find("-->") {
                    Some(end) => {
                        i = start + end + 3;
                        continue;
                    }
                    None => break,
                }
            }

            let caps = match OPEN_TAG_RE.captures(rest) {
                Some(caps) => caps,
                None => {
                    i = start + 1;
                    continue;
                }
            };
            let tag = caps[1].to_string();
            let attrs = parse_attrs(&caps[2]);
            let self_closing = !caps[3].is_empty();
            let content_start = start + caps[0].len();
            let tag_loc = location_at(source, start);

            let (content, next) = if self_closing {
                ("", content_start)
            } else {
                match find_close_tag(source, content_start, &tag) {
                    Some((content_end, close_end)) => (&source[content_start..content_end], close_end),
                    None => {
                        errors.push(ParseError::new(
                            format!("Element <{}> is missing end tag.", tag),
                            &file,
                            tag_loc.line,
                            tag_loc.column,
                        ));
                        break;
                    }
                }
            };
            i = next;

            let loc = location_at(source, content_start);
            match tag.as_str() {
                "template" => {
                    if descriptor.template.is_some() {
                        errors.push(duplicate_error("template", &file, &tag_loc));
                    } else {
                        descriptor.template = Some(Block::new(BlockKind::Template, content, attrs, loc));
                    }
                }
                "script" => {
                    let is_setup = attrs.contains_key("setup");
                    let slot = if is_setup {
                        &mut descriptor.script_setup
                    } else {
                        &mut descriptor.script
                    };
                    if slot.is_some() {
                        let name = if is_setup { "script setup" } else { "script" };
                        errors.push(duplicate_error(name, &file, &tag_loc));
                    } else {
                        let kind = if is_setup {
                            BlockKind::ScriptSetup
                        } else {
                            BlockKind::Script
                        };
                        *slot = Some(Block::new(kind, content, attrs, loc));
                    }
                }
                "style" => descriptor
                    .styles
                    .push(Block::new(BlockKind::Style, content, attrs, loc)),
                _ => descriptor
                    .custom_blocks
                    .push(Block::new(BlockKind::Custom(tag), content, attrs, loc)),
            }
        }

        descriptor.css_vars = parse_css_vars(&descriptor.styles);
        descriptor.force_reload = ForceReloadRule::for_setup(descriptor.script_setup.as_ref());

        ParseOutput { descriptor, errors }
    }
}

fn duplicate_error(name: &str, file: &str, loc: &SourceLocation) -> ParseError {
    ParseError::new(
        format!("Single file component can contain only one <{}> element", name),
        file,
        loc.line,
        loc.column,
    )
}

fn parse_attrs(attr_string: &str) -> Attrs {
    let mut attrs = Attrs::new();
    for caps in ATTR_RE.captures_iter(attr_string) {
        let name = caps[1].to_string();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| AttrValue::Str(m.as_str().to_string()))
            .unwrap_or(AttrValue::Flag);
        attrs.insert(name, value);
    }
    attrs
}

/// Returns `(content_end, after_close)` for the close tag matching an open
/// `tag` whose content starts at `from`.
fn find_close_tag(source: &str, from: usize, tag: &str) -> Option<(usize, usize)> {
    if tag == "template" {
        let mut depth = 1;
        for m in NESTED_TEMPLATE_RE.captures_iter(&source[from..]) {
            let whole = m.get(0)?;
            if whole.as_str().starts_with("</") {
                depth -= 1;
                if depth == 0 {
                    return Some((from + whole.start(), from + whole.end()));
                }
            } else if m.get(1).map_or(true, |s| s.as_str().is_empty()) {
                depth += 1;
            }
        }
        return None;
    }

    let mut cursor = from;
    while let Some(found) = source[cursor..].find("</") {
        let start = cursor + found;
        let after_name = start + 2 + tag.len();
        if source[start + 2..].starts_with(tag) {
            let rest = &source[after_name..];
            let trimmed = rest.trim_start();
            if trimmed.starts_with('>') {
                return Some((start, after_name + (rest.len() - trimmed.len()) + 1));
            }
        }
        cursor = start + 2;
    }
    None
}

/// 1-based line and column of a byte offset.
fn location_at(source: &str, offset: usize) -> SourceLocation {
    let before = &source[..offset];
    let line = before.matches('\n').count() as u32 + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count(),
        None => before.chars().count(),
    } as u32
        + 1;
    SourceLocation { line, column }
}

/// Variables bound into styles with `v-bind(...)`, in first-seen order.
pub fn parse_css_vars(styles: &[Block]) -> Vec<String> {
    let mut vars: Vec<String> = Vec::new();
    for style in styles {
        let content = CSS_COMMENT_RE.replace_all(&style.content, "");
        for caps in V_BIND_RE.captures_iter(&content) {
            let var = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            if !var.is_empty() && !vars.contains(&var) {
                vars.push(var);
            }
        }
    }
    vars
}
