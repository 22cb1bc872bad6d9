//! Block-level diff between two revisions of a descriptor.
//!
//! Blocks are paired by kind and index, never by content.

use serde::Serialize;

use crate::descriptor::{Attrs, Block, Descriptor};
use crate::script::ResolvedScript;

/// Same block for update purposes. Blocks pointing at the same `src` are
/// equal; the external file reports its own changes.
pub fn block_equals(a: Option<&Block>, b: Option<&Block>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            if let (Some(sa), Some(sb)) = (&a.src, &b.src) {
                if sa == sb {
                    return true;
                }
            }
            a.content == b.content && attrs_equal(&a.attrs, &b.attrs)
        }
        _ => false,
    }
}

fn attrs_equal(a: &Attrs, b: &Attrs) -> bool {
    a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
}

/// The behavior block must be recompiled.
///
/// Besides a textual change of either script block this covers markup edits
/// that change which imports the markup consumes, since the compiled script
/// only keeps the imports the markup uses.
pub fn script_changed(prev: &Descriptor, next: &Descriptor, prev_resolved: Option<&ResolvedScript>) -> bool {
    if !block_equals(prev.script.as_ref(), next.script.as_ref()) {
        return true;
    }
    if !block_equals(prev.script_setup.as_ref(), next.script_setup.as_ref()) {
        return true;
    }
    match prev_resolved.and_then(|r| r.imports.as_ref()) {
        Some(prev_imports) => next.template.is_none() || next.should_force_reload(prev_imports),
        None => false,
    }
}

/// Per-index comparison of an ordered block list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockListDiff {
    /// One entry per block of the next revision; a block with no counterpart
    /// in the previous revision counts as changed.
    pub changed: Vec<bool>,
    /// Trailing blocks were removed.
    pub removed: bool,
    /// Trailing blocks were added.
    pub added: bool,
}

impl BlockListDiff {
    pub fn compute(prev: &[Block], next: &[Block]) -> Self {
        let changed = next
            .iter()
            .enumerate()
            .map(|(i, block)| !block_equals(prev.get(i), Some(block)))
            .collect();
        Self {
            changed,
            removed: prev.len() > next.len(),
            added: prev.len() < next.len(),
        }
    }

    pub fn any_changed(&self) -> bool {
        self.changed.iter().any(|c| *c)
    }

    pub fn count_changed(&self) -> bool {
        self.removed || self.added
    }

    pub fn is_unchanged(&self) -> bool {
        !self.any_changed() && !self.count_changed()
    }

    pub fn changed_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.changed
            .iter()
            .enumerate()
            .filter(|(_, c)| **c)
            .map(|(i, _)| i)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorDiff {
    pub script_changed: bool,
    pub template_changed: bool,
    pub css_vars_changed: bool,
    pub scoped_changed: bool,
    pub styles: BlockListDiff,
    pub custom_blocks: BlockListDiff,
}

pub fn diff(prev: &Descriptor, next: &Descriptor, prev_resolved: Option<&ResolvedScript>) -> DescriptorDiff {
    DescriptorDiff {
        script_changed: script_changed(prev, next, prev_resolved),
        template_changed: !block_equals(prev.template.as_ref(), next.template.as_ref()),
        css_vars_changed: prev.css_vars != next.css_vars,
        scoped_changed: prev.scoped() != next.scoped(),
        styles: BlockListDiff::compute(&prev.styles, &next.styles),
        custom_blocks: BlockListDiff::compute(&prev.custom_blocks, &next.custom_blocks),
    }
}

/// Nothing but the markup differs, so a re-render is enough.
pub fn is_only_template_changed(prev: &Descriptor, next: &Descriptor, prev_resolved: Option<&ResolvedScript>) -> bool {
    !script_changed(prev, next, prev_resolved)
        && BlockListDiff::compute(&prev.styles, &next.styles).is_unchanged()
        && BlockListDiff::compute(&prev.custom_blocks, &next.custom_blocks).is_unchanged()
}
