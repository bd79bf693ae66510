//! Write-order planning.
//!
//! A live dev server recompiles on every write, so a batch must land
//! leaf modules before the modules that import them and entrypoints
//! absolutely last, or the preview flashes transient import errors
//! mid-batch. Ordering is by coarse path rank, then depth (deeper
//! first), then path.

use crate::paths::{depth, parent_dir, HTML_ENTRY, PUBLIC_ROOT, SOURCE_ROOT};

/// Coarse write rank for one normalized path. Lower writes first.
fn rank(path: &str) -> u8 {
    if path == HTML_ENTRY {
        return 6;
    }
    let base = crate::paths::basename(path);
    let in_source_root = parent_dir(path) == SOURCE_ROOT;
    if in_source_root {
        if matches!(base, "main.jsx" | "main.tsx" | "main.js" | "index.jsx" | "index.tsx") {
            return 5;
        }
        if matches!(base, "App.jsx" | "App.tsx" | "App.js") {
            return 4;
        }
        if base == "index.css" {
            return 3;
        }
    }
    if path.starts_with(&format!("{}/", PUBLIC_ROOT)) {
        return 2;
    }
    if path.starts_with(&format!("{}/", SOURCE_ROOT)) && depth(path) >= 2 {
        // Nested component/page/util directories: leaves first.
        return 0;
    }
    // Shared top-level source files, root-level extras, route files.
    1
}

/// Sort a batch into safe write order. Stable and total: rank ascending,
/// deeper paths first within a rank, then lexicographic.
pub fn plan_write_order(paths: &mut Vec<String>) {
    paths.sort_by(|a, b| {
        rank(a)
            .cmp(&rank(b))
            .then(depth(b).cmp(&depth(a)))
            .then(a.cmp(b))
    });
}
