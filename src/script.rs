//! Behavior block resolution.
//!
//! The HMR core only needs one fact from the script compiler: which imports
//! the behavior block declares and whether the markup consumes each one. The
//! TypeScript compiler drops imports the markup does not use, so that set
//! decides whether a markup-only edit must recompile the script too.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{ImportDeclarationSpecifier, Statement};
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::descriptor::{Block, Descriptor};
use crate::paths::resolve_type_file;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"<([A-Za-z][\w.-]*)([^>]*)>").unwrap();
    static ref ATTR_RE: Regex =
        Regex::new(r#"([^\s=/>"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'))?"#).unwrap();
    static ref INTERPOLATION_RE: Regex = Regex::new(r"\{\{([\s\S]*?)\}\}").unwrap();
    static ref STRING_LITERAL_RE: Regex = Regex::new(r#"'[^']*'|"[^"]*"|`[^`]*`"#).unwrap();
    static ref IDENT_RE: Regex = Regex::new(r"(?:^|[^.\w$])([A-Za-z_$][\w$]*)").unwrap();
}

const BUILT_IN_DIRECTIVES: &[&str] = &[
    "bind", "cloak", "else-if", "else", "for", "html", "if", "model", "on", "once", "pre",
    "show", "slot", "text", "memo", "is",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBinding {
    pub source: String,
    pub is_type: bool,
    pub is_used_in_markup: bool,
}

/// What the script compiler learned about one descriptor revision.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedScript {
    /// Local name → import. `None` when there is no setup block to compile.
    pub imports: Option<BTreeMap<String, ImportBinding>>,
    /// Files type information was read from.
    pub type_deps: Vec<PathBuf>,
}

/// Compiles, or at least analyses, the behavior block of a descriptor.
pub trait ScriptResolver: Send + Sync {
    fn resolve(&self, descriptor: &Descriptor) -> ResolvedScript;
}

/// Collects imports with oxc and checks them against the markup.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImportScanner;

impl ScriptResolver for ImportScanner {
    fn resolve(&self, descriptor: &Descriptor) -> ResolvedScript {
        if descriptor.script_setup.is_none() {
            return ResolvedScript::default();
        }

        let mut imports = BTreeMap::new();
        let mut type_deps = Vec::new();
        let dir = descriptor
            .filename
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();

        for block in descriptor.script.iter().chain(descriptor.script_setup.iter()) {
            for (local, binding) in scan_imports(block) {
                if binding.is_type && binding.source.starts_with('.') {
                    let dep = resolve_type_file(&dir, &binding.source);
                    if !type_deps.contains(&dep) {
                        type_deps.push(dep);
                    }
                }
                let is_used_in_markup = is_import_used(&local, descriptor);
                imports.insert(
                    local,
                    ImportBinding {
                        is_used_in_markup,
                        ..binding
                    },
                );
            }
        }

        ResolvedScript {
            imports: Some(imports),
            type_deps,
        }
    }
}

fn scan_imports(block: &Block) -> Vec<(String, ImportBinding)> {
    let allocator = Allocator::default();
    let is_ts = matches!(block.lang.as_deref(), Some("ts") | Some("tsx"));
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(is_ts)
        .with_jsx(matches!(block.lang.as_deref(), Some("tsx") | Some("jsx")));
    let ret = Parser::new(&allocator, &block.content, source_type).parse();

    let mut found = Vec::new();
    for stmt in &ret.program.body {
        if let Statement::ImportDeclaration(import_decl) = stmt {
            let source = import_decl.source.value.to_string();
            let decl_is_type = import_decl.import_kind.is_type();
            let Some(specifiers) = &import_decl.specifiers else {
                continue;
            };
            for specifier in specifiers {
                let (local, is_type) = match specifier {
                    ImportDeclarationSpecifier::ImportSpecifier(s) => {
                        (s.local.name.to_string(), decl_is_type || s.import_kind.is_type())
                    }
                    ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                        (s.local.name.to_string(), decl_is_type)
                    }
                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                        (s.local.name.to_string(), decl_is_type)
                    }
                };
                found.push((
                    local,
                    ImportBinding {
                        source: source.clone(),
                        is_type,
                        is_used_in_markup: false,
                    },
                ));
            }
        }
    }
    found
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKUP USAGE
// ═══════════════════════════════════════════════════════════════════════════════

/// True if the descriptor's markup references `local`.
pub fn is_import_used(local: &str, descriptor: &Descriptor) -> bool {
    descriptor
        .template
        .as_ref()
        .map(|t| markup_identifiers(&t.content).contains(local))
        .unwrap_or(false)
}

/// Identifiers the markup may resolve from the script scope: component tags,
/// custom directives, `ref`s and names used in expressions.
pub fn markup_identifiers(content: &str) -> HashSet<String> {
    let mut ids = HashSet::new();

    for tag in TAG_RE.captures_iter(content) {
        let name = camelize(&tag[1]);
        ids.insert(capitalize(&name));
        ids.insert(name);

        for attr in ATTR_RE.captures_iter(&tag[2]) {
            let attr_name = &attr[1];
            let value = attr.get(2).or_else(|| attr.get(3)).map(|m| m.as_str());

            if attr_name == "ref" {
                if let Some(v) = value {
                    ids.insert(v.to_string());
                }
                continue;
            }

            let directive = if let Some(rest) = attr_name.strip_prefix("v-") {
                let name = rest.split([':', '.']).next().unwrap_or(rest);
                if !BUILT_IN_DIRECTIVES.contains(&name) {
                    ids.insert(format!("v{}", capitalize(&camelize(name))));
                }
                true
            } else {
                attr_name.starts_with(':') || attr_name.starts_with('@') || attr_name.starts_with('#')
            };
            if !directive {
                continue;
            }

            match value {
                Some(exp) => extract_identifiers(exp, &mut ids),
                // `:foo` same-name shorthand
                None => {
                    if let Some(arg) = attr_name.strip_prefix(':') {
                        ids.insert(camelize(arg.split('.').next().unwrap_or(arg)));
                    }
                }
            }
        }
    }

    for caps in INTERPOLATION_RE.captures_iter(content) {
        extract_identifiers(&caps[1], &mut ids);
    }

    ids
}

fn extract_identifiers(exp: &str, ids: &mut HashSet<String>) {
    let stripped = STRING_LITERAL_RE.replace_all(exp, " ");
    for caps in IDENT_RE.captures_iter(&stripped) {
        ids.insert(caps[1].to_string());
    }
}

fn camelize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper = false;
    for c in s.chars() {
        if c == '-' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
