//! Descriptor cache.
//!
//! One [`DescriptorCache`] lives for a whole build session and is handed to
//! every operation by reference. It keeps, per file:
//!
//! - `current`: the descriptor the compile pipeline last produced,
//! - `hmr`: the descriptor the update classifier last analysed,
//! - `previous`: whatever `current` held before the last invalidation.
//!
//! Entries for different files can be touched concurrently. Events for the
//! same file must be serialised by the host: an edit is parsed, classified
//! and invalidated before the next edit of that file starts. Interleaving a
//! `create` with an `invalidate` of the same file can leave `previous` newer
//! than `current`.

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::descriptor::{BlockKind, ComponentParser, Descriptor, ParseOptions};
use crate::diff::is_only_template_changed;
use crate::error::{HmrError, ParseError, Result};
use crate::options::PluginOptions;
use crate::paths::normalize_path;
use crate::script::ResolvedScript;

pub struct CreatedDescriptor {
    pub descriptor: Arc<Descriptor>,
    pub errors: Vec<ParseError>,
}

/// Result of registering a freshly compiled source with the cache.
pub struct CompileEntry {
    pub descriptor: Arc<Descriptor>,
    pub errors: Vec<ParseError>,
    pub previous: Option<Arc<Descriptor>>,
    /// Only the markup changed since `previous`; the runtime may swap the
    /// render function instead of reloading the component.
    pub rerender_only: bool,
}

#[derive(Default)]
struct CacheState {
    current: HashMap<PathBuf, Arc<Descriptor>>,
    hmr: HashMap<PathBuf, Arc<Descriptor>>,
    previous: HashMap<PathBuf, Arc<Descriptor>>,
    /// External `src` file (optionally `?src=<owner id>`) → owning descriptor.
    links: HashMap<String, Arc<Descriptor>>,
    /// (revision, ssr) → resolved script.
    resolved: HashMap<(u64, bool), Arc<ResolvedScript>>,
}

impl CacheState {
    fn active(&mut self, hmr: bool) -> &mut HashMap<PathBuf, Arc<Descriptor>> {
        if hmr {
            &mut self.hmr
        } else {
            &mut self.current
        }
    }

    /// Drop the resolved scripts of a descriptor that left one of the maps,
    /// unless another map for the same file still holds that revision.
    fn release(&mut self, filename: &Path, released: &Descriptor) {
        let revision = released.revision;
        let still_held = [&self.current, &self.hmr, &self.previous]
            .into_iter()
            .any(|map| map.get(filename).is_some_and(|d| d.revision == revision));
        if !still_held {
            self.resolved.retain(|(rev, _), _| *rev != revision);
        }
    }

    fn replace(&mut self, filename: &Path, descriptor: Arc<Descriptor>, hmr: bool) {
        if let Some(replaced) = self.active(hmr).insert(filename.to_path_buf(), descriptor) {
            self.release(filename, &replaced);
        }
    }
}

pub struct DescriptorCache {
    options: PluginOptions,
    parser: Arc<dyn ComponentParser>,
    state: RwLock<CacheState>,
    next_revision: AtomicU64,
}

impl DescriptorCache {
    pub fn new(options: PluginOptions, parser: Arc<dyn ComponentParser>) -> Self {
        Self {
            options,
            parser,
            state: RwLock::new(CacheState::default()),
            next_revision: AtomicU64::new(1),
        }
    }

    pub fn options(&self) -> &PluginOptions {
        &self.options
    }

    pub fn compute_hash(input: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        let hex = format!("{:x}", hasher.finalize());
        hex[..8].to_string()
    }

    /// Component id: hash of the root-relative path, plus the source when the
    /// id strategy asks for it.
    pub fn compute_id(&self, filename: &Path, source: &str) -> String {
        let relative = filename.strip_prefix(&self.options.root).unwrap_or(filename);
        let mut input = relative.to_string_lossy().replace('\\', "/");
        if self.options.hash_source() {
            input.push_str(source);
        }
        Self::compute_hash(&input)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CURRENT / HMR
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn create(&self, filename: &Path, source: &str, hmr: bool) -> CreatedDescriptor {
        let output = self.parser.parse(
            source,
            &ParseOptions {
                filename,
                source_map: self.options.source_map,
            },
        );
        let mut descriptor = output.descriptor;
        descriptor.id = self.compute_id(filename, source);
        descriptor.revision = self.next_revision.fetch_add(1, Ordering::Relaxed);
        let descriptor = Arc::new(descriptor);

        self.state.write().replace(filename, descriptor.clone(), hmr);

        CreatedDescriptor {
            descriptor,
            errors: output.errors,
        }
    }

    /// Cached descriptor for `filename`. On a miss with `create_if_absent`
    /// the file is read from disk and parsed; otherwise `None` means the file
    /// has not been seen by this session yet.
    pub fn get(&self, filename: &Path, create_if_absent: bool, hmr: bool) -> Result<Option<Arc<Descriptor>>> {
        let cached = {
            let state = self.state.read();
            let map = if hmr { &state.hmr } else { &state.current };
            map.get(filename).cloned()
        };
        if cached.is_some() || !create_if_absent {
            return Ok(cached);
        }

        let source = fs::read_to_string(filename).map_err(|e| HmrError::Io {
            path: filename.to_path_buf(),
            source: e,
        })?;
        Ok(Some(self.create(filename, &source, hmr).descriptor))
    }

    /// Store a descriptor in `current` without touching `previous`.
    pub fn set_current(&self, filename: &Path, descriptor: Arc<Descriptor>) {
        self.state.write().replace(filename, descriptor, false);
    }

    /// Move the active entry into `previous`. No-op when nothing is cached.
    pub fn invalidate(&self, filename: &Path, hmr: bool) {
        let mut state = self.state.write();
        let Some(prev) = state.active(hmr).remove(filename) else {
            return;
        };
        debug!(file = %filename.display(), revision = prev.revision, hmr, "descriptor invalidated");
        if let Some(evicted) = state.previous.insert(filename.to_path_buf(), prev) {
            state.release(filename, &evicted);
        }
    }

    pub fn previous(&self, filename: &Path) -> Option<Arc<Descriptor>> {
        self.state.read().previous.get(filename).cloned()
    }

    /// Register a compiled source: parse it into `current`, seed the HMR
    /// baseline if this is the first time the file is compiled, and compare
    /// against `previous`.
    pub fn compile_entry(&self, filename: &Path, source: &str) -> CompileEntry {
        let previous = self.previous(filename);
        let CreatedDescriptor { descriptor, errors } = self.create(filename, source, false);

        let has_baseline = self.state.read().hmr.contains_key(filename);
        if !has_baseline {
            let baseline = if self.options.is_component_file(filename) {
                fs::read_to_string(filename).ok()
            } else {
                Some(source.to_string())
            };
            if let Some(baseline) = baseline {
                self.create(filename, &baseline, true);
            }
        }

        let rerender_only = previous
            .as_ref()
            .map(|prev| {
                let resolved = self.resolved_script(prev, false);
                is_only_template_changed(prev, &descriptor, resolved.as_deref())
            })
            .unwrap_or(false);

        CompileEntry {
            descriptor,
            errors,
            previous,
            rerender_only,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXTERNAL SOURCES
    // ═══════════════════════════════════════════════════════════════════════════

    fn link_key(external_path: &Path, scoped_owner: Option<&str>) -> String {
        let path = normalize_path(external_path).to_string_lossy().into_owned();
        match scoped_owner {
            Some(id) => format!("{}?src={}", path, id),
            None => path,
        }
    }

    pub fn link_external_source(&self, external_path: &Path, owner: Arc<Descriptor>, scoped: bool) {
        let key = Self::link_key(external_path, scoped.then_some(owner.id.as_str()));
        self.state.write().links.insert(key, owner);
    }

    /// Owning descriptor of an external source. `scoped_owner` is the
    /// `src=<id>` marker of a scoped request.
    pub fn linked_descriptor(&self, external_path: &Path, scoped_owner: Option<&str>) -> Result<Arc<Descriptor>> {
        let key = Self::link_key(external_path, scoped_owner);
        self.state
            .read()
            .links
            .get(&key)
            .cloned()
            .ok_or_else(|| HmrError::LinkResolution {
                src: key,
                importer: "<unlinked>".to_string(),
            })
    }

    /// Resolve every block `src` against the component's directory and link
    /// the resolved file back to `descriptor`.
    pub fn link_block_sources(&self, descriptor: &Arc<Descriptor>) -> Result<()> {
        let dir = descriptor.filename.parent().unwrap_or_else(|| Path::new(""));
        let component_scoped = descriptor.scoped();

        for block in descriptor.blocks() {
            let Some(src) = &block.src else {
                continue;
            };
            let resolved = normalize_path(&dir.join(src));
            if !resolved.is_file() {
                return Err(HmrError::LinkResolution {
                    src: src.clone(),
                    importer: descriptor.filename.display().to_string(),
                });
            }
            let scoped = match block.kind {
                BlockKind::Style => block.scoped,
                BlockKind::Template => component_scoped,
                _ => false,
            };
            self.link_external_source(&resolved, descriptor.clone(), scoped);
        }
        Ok(())
    }

    /// Drop every link for a removed external file, and any entries cached
    /// under its own name.
    pub fn forget_external(&self, path: &Path) {
        let plain = Self::link_key(path, None);
        let scoped_prefix = format!("{}?src=", plain);
        let mut state = self.state.write();
        state
            .links
            .retain(|key, _| key != &plain && !key.starts_with(&scoped_prefix));
        for hmr in [false, true] {
            if let Some(removed) = state.active(hmr).remove(path) {
                state.release(path, &removed);
            }
        }
        debug!(file = %path.display(), "external source forgotten");
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RESOLVED SCRIPTS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn resolved_script(&self, descriptor: &Descriptor, ssr: bool) -> Option<Arc<ResolvedScript>> {
        self.state
            .read()
            .resolved
            .get(&(descriptor.revision, ssr))
            .cloned()
    }

    pub fn set_resolved_script(&self, descriptor: &Descriptor, ssr: bool, resolved: Arc<ResolvedScript>) {
        self.state
            .write()
            .resolved
            .insert((descriptor.revision, ssr), resolved);
    }

    /// Forget the resolved scripts of the file's active descriptors.
    pub fn invalidate_script(&self, filename: &Path) {
        let mut state = self.state.write();
        let revisions: Vec<u64> = [state.current.get(filename), state.hmr.get(filename)]
            .into_iter()
            .flatten()
            .map(|d| d.revision)
            .collect();
        state.resolved.retain(|(rev, _), _| !revisions.contains(rev));
    }
}
