//! Entrypoint patching.
//!
//! When a batch introduces a new root app module or main module (often
//! under a different extension than the scaffold's), the bootstrap
//! references that load them go stale: the HTML document keeps loading
//! the superseded main module, or the main module keeps importing the
//! superseded app root. This post-pass rewrites those references so the
//! running dev server picks up what was actually written. Re-running
//! with the same inputs produces no further patches.

use regex::Regex;
use std::collections::{BTreeMap, HashSet};

use crate::paths::HTML_ENTRY;
use crate::sandbox::Sandbox;

/// Bootstrap module candidates, in resolution-preference order.
const MAIN_CANDIDATES: &[&str] = &[
    "src/main.jsx",
    "src/main.tsx",
    "src/main.js",
    "src/index.jsx",
    "src/index.tsx",
];
const APP_CANDIDATES: &[&str] = &["src/App.jsx", "src/App.tsx", "src/App.js"];

/// A rewritten bootstrap file, to be re-emitted through the write path
/// and recorded as updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrypointPatch {
    pub path: String,
    pub content: String,
}

/// Compute bootstrap rewrites for one completed batch.
///
/// `batch` maps paths written this run to their content; `known_files`
/// covers everything on disk plus the batch. Unreadable bootstrap files
/// are skipped, never fatal.
pub async fn patch_entrypoints(
    sandbox: &dyn Sandbox,
    batch: &BTreeMap<String, String>,
    known_files: &HashSet<String>,
) -> Vec<EntrypointPatch> {
    let mut patches = Vec::new();

    if let Some(patch) = patch_html_entry(sandbox, batch, known_files).await {
        patches.push(patch);
    }
    if let Some(patch) = patch_main_module(sandbox, batch, known_files).await {
        patches.push(patch);
    }
    patches
}

/// Repoint the HTML document's script entry when the batch wrote a main
/// module the document does not reference, or when the referenced main
/// module no longer exists.
async fn patch_html_entry(
    sandbox: &dyn Sandbox,
    batch: &BTreeMap<String, String>,
    known_files: &HashSet<String>,
) -> Option<EntrypointPatch> {
    let html = read_current(sandbox, batch, HTML_ENTRY).await?;
    let script_re = Regex::new(r#"src="(/?src/(?:main|index)\.\w+)""#).unwrap();
    let referenced = script_re.captures(&html)?.get(1)?.as_str().to_string();
    let referenced_path = referenced.trim_start_matches('/').to_string();

    let target = if let Some(written) = first_in(MAIN_CANDIDATES, |p| batch.contains_key(p)) {
        // A freshly written main module supersedes whatever the document
        // currently loads.
        written
    } else if !known_files.contains(&referenced_path) {
        first_in(MAIN_CANDIDATES, |p| known_files.contains(p))?
    } else {
        return None;
    };

    if target == referenced_path {
        return None;
    }
    let content = html.replace(
        &format!("src=\"{}\"", referenced),
        &format!("src=\"/{}\"", target),
    );
    Some(EntrypointPatch { path: HTML_ENTRY.to_string(), content })
}

/// Repoint the main module's app-root import when the batch wrote an app
/// module under a different extension, or when the referenced app module
/// no longer exists.
async fn patch_main_module(
    sandbox: &dyn Sandbox,
    batch: &BTreeMap<String, String>,
    known_files: &HashSet<String>,
) -> Option<EntrypointPatch> {
    let main_path = first_in(MAIN_CANDIDATES, |p| known_files.contains(p))?;
    let main_src = read_current(sandbox, batch, &main_path).await?;

    let import_re = Regex::new(r#"from\s+['"](\./App(?:\.\w+)?)['"]"#).unwrap();
    let specifier = import_re.captures(&main_src)?.get(1)?.as_str().to_string();

    let written_app = first_in(APP_CANDIDATES, |p| batch.contains_key(p));
    let referenced = specifier_target(&specifier);
    let target = match (written_app, referenced) {
        // Explicit extension pointing away from the module just written.
        (Some(app), Some(referenced)) if app != referenced => app,
        // Extensionless import is ambiguous once two App modules exist;
        // pin it to the one just written.
        (Some(app), None)
            if APP_CANDIDATES
                .iter()
                .any(|c| *c != app.as_str() && known_files.contains(*c)) =>
        {
            app
        }
        // Nothing written this batch: heal a dangling explicit reference.
        (None, Some(referenced)) if !known_files.contains(&referenced) => {
            first_in(APP_CANDIDATES, |p| known_files.contains(p))?
        }
        _ => return None,
    };

    let new_specifier = format!("./{}", target.trim_start_matches("src/"));
    if new_specifier == specifier {
        return None;
    }
    let content = main_src.replace(
        &format!("'{}'", specifier),
        &format!("'{}'", new_specifier),
    );
    let content = content.replace(
        &format!("\"{}\"", specifier),
        &format!("\"{}\"", new_specifier),
    );
    Some(EntrypointPatch { path: main_path, content })
}

/// `./App.tsx` -> `src/App.tsx`; extensionless specifiers return `None`.
fn specifier_target(specifier: &str) -> Option<String> {
    let name = specifier.trim_start_matches("./");
    if name.contains('.') {
        Some(format!("src/{}", name))
    } else {
        None
    }
}

fn first_in(candidates: &[&str], pred: impl Fn(&str) -> bool) -> Option<String> {
    candidates
        .iter()
        .copied()
        .find(|c| pred(c))
        .map(str::to_string)
}

/// Batch content wins over what is on disk.
async fn read_current(
    sandbox: &dyn Sandbox,
    batch: &BTreeMap<String, String>,
    path: &str,
) -> Option<String> {
    if let Some(content) = batch.get(path) {
        return Some(content.clone());
    }
    sandbox.read_file(path).await.ok()
}
