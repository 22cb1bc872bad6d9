//! Hot update classification.
//!
//! Given the previous and the freshly edited descriptor of a file plus the
//! host's live modules for it, decide which modules must be replaced. Any
//! time an expected module cannot be found the main module is invalidated
//! instead, trading a cheaper update for a correct one.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::cache::{CompileEntry, DescriptorCache};
use crate::descriptor::Descriptor;
use crate::diff::{diff, DescriptorDiff};
use crate::error::{HmrError, Result};
use crate::query::{
    is_css_request, is_inline_request, is_main_candidate, is_script_module, is_template_module,
    matches_custom, matches_style,
};
use crate::script::{ResolvedScript, ScriptResolver};

// ═══════════════════════════════════════════════════════════════════════════════
// LIVE MODULE GRAPH
// ═══════════════════════════════════════════════════════════════════════════════

/// A module the host currently has loaded.
#[derive(Debug)]
pub struct LiveModule {
    pub url: String,
    pub importers: Vec<Arc<LiveModule>>,
}

impl LiveModule {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Self::with_importers(url, Vec::new())
    }

    pub fn with_importers(url: impl Into<String>, importers: Vec<Arc<LiveModule>>) -> Arc<Self> {
        Arc::new(Self {
            url: url.into(),
            importers,
        })
    }
}

/// Host module graph lookups needed outside of a single file's update.
pub trait ModuleGraph {
    fn modules_by_file(&self, file: &Path) -> Vec<Arc<LiveModule>>;
}

/// The module representing the whole file: the shortest address without a
/// block type, or a script address.
pub fn main_module(modules: &[Arc<LiveModule>]) -> Option<&Arc<LiveModule>> {
    modules
        .iter()
        .filter(|m| is_main_candidate(&m.url))
        .min_by_key(|m| m.url.len())
}

pub fn script_module(modules: &[Arc<LiveModule>]) -> Option<&Arc<LiveModule>> {
    modules.iter().find(|m| is_script_module(&m.url))
}

pub fn template_module(modules: &[Arc<LiveModule>]) -> Option<&Arc<LiveModule>> {
    modules.iter().find(|m| is_template_module(&m.url))
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASSIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateKind {
    Template,
    Style,
}

impl UpdateKind {
    fn label(&self) -> &'static str {
        match self {
            UpdateKind::Template => "template",
            UpdateKind::Style => "style",
        }
    }
}

/// Modules to replace, de-duplicated by address in insertion order.
#[derive(Debug, Default)]
struct AffectedSet {
    modules: IndexMap<String, Arc<LiveModule>>,
    touched: bool,
}

impl AffectedSet {
    fn add(&mut self, module: Option<&Arc<LiveModule>>) {
        self.touched = true;
        if let Some(m) = module {
            self.modules.entry(m.url.clone()).or_insert_with(|| m.clone());
        }
    }

    fn contains(&self, module: &LiveModule) -> bool {
        self.modules.contains_key(&module.url)
    }
}

#[derive(Debug, Default)]
pub struct Classification {
    pub affected: Vec<Arc<LiveModule>>,
    pub kinds: Vec<UpdateKind>,
    /// Some rule fired, even if the module it wanted is not loaded.
    pub changed: bool,
}

impl Classification {
    pub fn kinds_label(&self) -> String {
        self.kinds
            .iter()
            .map(UpdateKind::label)
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Turn a descriptor diff into the set of live modules to update.
pub fn classify(
    diff: &DescriptorDiff,
    prev: &Descriptor,
    next: &Descriptor,
    modules: &[Arc<LiveModule>],
) -> Classification {
    let main = main_module(modules);
    let template = template_module(modules);
    let mut affected = AffectedSet::default();
    let mut kinds = Vec::new();

    if diff.script_changed {
        affected.add(script_module(modules).or(main));
    }

    if diff.template_changed {
        affected.add(template);
        kinds.push(UpdateKind::Template);
    }

    // css variable injection is compiled into the main module
    if diff.css_vars_changed {
        affected.add(main);
    }

    // scoped attribute selectors are baked into the compiled markup
    if diff.scoped_changed {
        affected.add(template);
        affected.add(main);
        if !kinds.contains(&UpdateKind::Template) {
            kinds.push(UpdateKind::Template);
        }
    }

    let mut style_updated = false;
    for i in diff.styles.changed_indices() {
        style_updated = true;
        let lang = next.styles[i].lang.as_deref().unwrap_or("css");
        match modules.iter().find(|m| matches_style(&m.url, i, lang)) {
            Some(m) => {
                affected.add(Some(m));
                if is_inline_request(&m.url) {
                    affected.add(main);
                }
            }
            None => {
                trace!(index = i, "no live module for style block, reloading main module");
                affected.add(main);
            }
        }
    }
    if diff.styles.removed {
        affected.add(main);
    }
    if style_updated {
        kinds.push(UpdateKind::Style);
    }

    // custom block contents may be consumed from script, so count changes reload
    if diff.custom_blocks.count_changed() {
        affected.add(main);
    } else {
        for i in diff.custom_blocks.changed_indices() {
            let prev_type = prev.custom_blocks[i].custom_type();
            let next_type = next.custom_blocks[i].custom_type();
            let found = match (prev_type, next_type) {
                (Some(p), Some(n)) if p == n => modules.iter().find(|m| matches_custom(&m.url, n, i)),
                _ => None,
            };
            affected.add(found.or(main));
        }
    }

    if kinds.contains(&UpdateKind::Template) && template.is_none() {
        // markup is compiled inline into the main module
        affected.add(main);
    } else if let Some(main) = main.filter(|m| !affected.contains(m)) {
        // stylesheets scanning the component's classes, e.g. utility css
        for importer in main.importers.iter().filter(|m| is_css_request(&m.url)) {
            affected.add(Some(importer));
        }
    }

    Classification {
        affected: affected.modules.into_values().collect(),
        kinds,
        changed: affected.touched,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPE DEPENDENCIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Maps files the script compiler read types from to the components that
/// read them.
#[derive(Debug, Default)]
pub struct TypeDepRegistry {
    deps: RwLock<HashMap<PathBuf, Vec<PathBuf>>>,
}

impl TypeDepRegistry {
    pub fn register(&self, component: &Path, deps: &[PathBuf]) {
        let mut map = self.deps.write();
        for dep in deps {
            let components = map.entry(dep.clone()).or_default();
            if !components.iter().any(|c| c == component) {
                components.push(component.to_path_buf());
            }
        }
    }

    pub fn components_for(&self, dep: &Path) -> Option<Vec<PathBuf>> {
        self.deps.read().get(dep).cloned()
    }

    pub fn remove(&self, dep: &Path) {
        self.deps.write().remove(dep);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION
// ═══════════════════════════════════════════════════════════════════════════════

fn merge_updates(first: &[Arc<LiveModule>], second: &[Arc<LiveModule>]) -> HotUpdate {
    let mut merged = AffectedSet::default();
    for module in first.iter().chain(second) {
        merged.add(Some(module));
    }
    HotUpdate::Update(merged.modules.into_values().collect())
}

/// Outcome of a file change. `NotApplicable` tells the host to propagate the
/// event unchanged.
#[derive(Debug)]
pub enum HotUpdate {
    NotApplicable,
    Update(Vec<Arc<LiveModule>>),
}

impl HotUpdate {
    pub fn modules(&self) -> Option<&[Arc<LiveModule>]> {
        match self {
            HotUpdate::NotApplicable => None,
            HotUpdate::Update(modules) => Some(modules),
        }
    }

    pub fn urls(&self) -> Vec<&str> {
        self.modules()
            .map(|ms| ms.iter().map(|m| m.url.as_str()).collect())
            .unwrap_or_default()
    }
}

/// State of one dev-server session: the descriptor cache, the script
/// resolver and the type dependency map.
pub struct HmrSession {
    cache: DescriptorCache,
    resolver: Arc<dyn ScriptResolver>,
    type_deps: TypeDepRegistry,
}

impl HmrSession {
    pub fn new(cache: DescriptorCache, resolver: Arc<dyn ScriptResolver>) -> Self {
        Self {
            cache,
            resolver,
            type_deps: TypeDepRegistry::default(),
        }
    }

    pub fn cache(&self) -> &DescriptorCache {
        &self.cache
    }

    pub fn type_deps(&self) -> &TypeDepRegistry {
        &self.type_deps
    }

    /// Resolved script of `descriptor`, computing and caching it on a miss.
    pub fn resolve_script(&self, descriptor: &Descriptor, ssr: bool) -> Arc<ResolvedScript> {
        if let Some(resolved) = self.cache.resolved_script(descriptor, ssr) {
            return resolved;
        }
        let resolved = Arc::new(self.resolver.resolve(descriptor));
        self.type_deps.register(&descriptor.filename, &resolved.type_deps);
        self.cache.set_resolved_script(descriptor, ssr, resolved.clone());
        resolved
    }

    /// Register a compiled source with the cache and resolve its script, along
    /// with the update baseline's when the baseline has not been resolved yet.
    pub fn compile_entry(&self, filename: &Path, source: &str) -> CompileEntry {
        let entry = self.cache.compile_entry(filename, source);
        let resolved = self.resolve_script(&entry.descriptor, false);

        if let Ok(Some(baseline)) = self.cache.get(filename, false, true) {
            if self.cache.resolved_script(&baseline, false).is_none() {
                if baseline.source == entry.descriptor.source {
                    self.cache.set_resolved_script(&baseline, false, resolved);
                } else {
                    self.resolve_script(&baseline, false);
                }
            }
        }
        entry
    }

    /// Classify an edit of a component file.
    ///
    /// The host must not start another update, or a compile, for the same
    /// file until this one returns.
    pub async fn hot_update<F, Fut>(&self, file: &Path, modules: &[Arc<LiveModule>], read: F) -> Result<HotUpdate>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::io::Result<String>>,
    {
        let Some(prev) = self.cache.get(file, false, true)? else {
            // not requested yet, e.g. an async component
            return Ok(HotUpdate::NotApplicable);
        };

        let content = read().await.map_err(|e| HmrError::Io {
            path: file.to_path_buf(),
            source: e,
        })?;
        // taken before `create` replaces the baseline and drops its entries
        let prev_resolved = self.resolve_script(&prev, false);
        let created = self.cache.create(file, &content, true);
        if !created.errors.is_empty() {
            debug!(file = %file.display(), errors = created.errors.len(), "updated source has parse errors");
        }
        let next = created.descriptor;

        let diff = diff(&prev, &next, Some(&*prev_resolved));
        let classification = classify(&diff, &prev, &next, modules);

        if diff.script_changed {
            self.resolve_script(&next, false);
        } else {
            self.cache.set_resolved_script(&next, false, prev_resolved);
        }

        if classification.changed {
            if self.cache.options().is_component_file(file) {
                self.cache.invalidate(file, false);
            } else {
                // a non-component host file would fail to reload from disk as
                // a component, so keep the fresh descriptor instead
                self.cache.set_current(file, next.clone());
                self.cache.link_external_source(file, next.clone(), false);
            }
            debug!("[vue:update({})] {}", classification.kinds_label(), file.display());
        }

        Ok(HotUpdate::Update(classification.affected))
    }

    /// Modules to reload because a file their script read types from changed.
    pub fn handle_type_dep_change(&self, components: &[PathBuf], graph: &dyn ModuleGraph) -> Vec<Arc<LiveModule>> {
        let mut affected = AffectedSet::default();
        for component in components {
            self.cache.invalidate_script(component);
            let modules = graph.modules_by_file(component);
            affected.add(script_module(&modules).or(main_module(&modules)));
        }
        affected.modules.into_values().collect()
    }

    /// Entry point for a watcher event: type dependency propagation plus, for
    /// handled files, the block classification.
    pub async fn on_file_changed<F, Fut>(
        &self,
        file: &Path,
        modules: &[Arc<LiveModule>],
        graph: &dyn ModuleGraph,
        read: F,
    ) -> Result<HotUpdate>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::io::Result<String>>,
    {
        let type_dep_modules = self
            .type_deps
            .components_for(file)
            .map(|components| self.handle_type_dep_change(&components, graph));
        let handled = self.cache.options().handles_file(file);

        if !handled {
            return Ok(match type_dep_modules {
                Some(extra) => merge_updates(modules, &extra),
                None => HotUpdate::NotApplicable,
            });
        }

        let update = self.hot_update(file, modules, read).await?;
        Ok(match (update, type_dep_modules) {
            (HotUpdate::Update(affected), Some(extra)) => merge_updates(&affected, &extra),
            // the file's own modules still go out, as for any unhandled file
            (HotUpdate::NotApplicable, Some(extra)) => merge_updates(modules, &extra),
            (update, None) => update,
        })
    }

    /// A linked `src` file was removed from disk.
    pub fn on_related_file_deleted(&self, file: &Path) {
        self.cache.forget_external(file);
        self.type_deps.remove(file);
    }
}
