//! Path helpers shared by the cache and the script resolver.

use std::path::{Component, Path, PathBuf};

/// Extensions tried, in order, for an extensionless type import.
const TYPE_EXTENSIONS: &[&str] = &["ts", "d.ts", "tsx", "vue"];

/// Resolve `.` and `..` components without touching the file system.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

/// The file a relative type import `source` in `dir` refers to, the way the
/// watcher will report it. Falls back to the normalised path when nothing on
/// disk matches.
pub fn resolve_type_file(dir: &Path, source: &str) -> PathBuf {
    let base = normalize_path(&dir.join(source));
    if base.is_file() {
        return base;
    }

    let file_name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let siblings = TYPE_EXTENSIONS
        .iter()
        .map(|ext| base.with_file_name(format!("{}.{}", file_name, ext)));
    let index = TYPE_EXTENSIONS
        .iter()
        .map(|ext| base.join(format!("index.{}", ext)));

    siblings.chain(index).find(|p| p.is_file()).unwrap_or(base)
}
