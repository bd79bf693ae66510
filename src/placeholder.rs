//! Placeholder reconciliation.
//!
//! Models routinely import modules they never generated. Rather than let
//! one missing file hard-fail the whole preview, this pass scans every
//! written source file for relative imports that resolve to nothing and
//! synthesizes a minimal stub at the first candidate path. A stand-in is
//! preferable to a blocked preview; the next ticket usually fills it in.

use regex::Regex;
use std::collections::HashSet;

use crate::paths::parent_dir;

/// Source extensions a relative specifier may resolve to, in order.
const SOURCE_EXTENSIONS: &[&str] = &["jsx", "js", "tsx", "ts"];

/// Asset extensions that never get stubs; a missing asset degrades
/// gracefully in the browser.
const ASSET_EXTENSIONS: &[&str] = &[
    "css", "svg", "png", "jpg", "jpeg", "gif", "webp", "ico", "mp3", "mp4", "woff", "woff2",
    "json",
];

/// Directories whose modules are assumed to be components.
const COMPONENT_DIRS: &[&str] = &["components", "pages", "app"];

/// A synthesized stub module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderFile {
    pub path: String,
    pub content: String,
}

/// One relative import found in a written file.
#[derive(Debug)]
struct RelativeImport {
    specifier: String,
    /// Default-import binding name, when the statement has one.
    default_binding: Option<String>,
}

/// Scan written files and synthesize stubs for unresolved relative
/// imports. `known_files` covers disk plus the batch; created stubs also
/// satisfy later imports within this same pass. Never overwrites
/// anything in `known_files` and never resolves outside the project
/// root.
pub fn reconcile_placeholders(
    written: &[(String, String)],
    known_files: &HashSet<String>,
) -> Vec<PlaceholderFile> {
    let mut created: Vec<PlaceholderFile> = Vec::new();
    let mut created_paths: HashSet<String> = HashSet::new();

    for (path, content) in written {
        if !has_source_extension(path) {
            continue;
        }
        let importer_dir = parent_dir(path);
        for import in extract_relative_imports(content) {
            let Some(resolved) = resolve_relative(importer_dir, &import.specifier) else {
                // Escapes the project root; refuse to synthesize there.
                tracing::warn!(specifier = %import.specifier, importer = %path, "relative import escapes project root");
                continue;
            };
            if is_asset(&resolved) {
                continue;
            }
            let candidates = candidate_paths(&resolved);
            let satisfied = candidates
                .iter()
                .any(|c| known_files.contains(c) || created_paths.contains(c));
            if satisfied {
                continue;
            }
            let stub_path = candidates[0].clone();
            let content = render_stub(&stub_path, import.default_binding.as_deref());
            created_paths.insert(stub_path.clone());
            created.push(PlaceholderFile { path: stub_path, content });
        }
    }
    created
}

fn has_source_extension(path: &str) -> bool {
    path.rsplit('.')
        .next()
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn is_asset(resolved: &str) -> bool {
    match resolved.rsplit_once('.') {
        Some((_, ext)) => ASSET_EXTENSIONS.contains(&ext),
        None => false,
    }
}

/// `from '...'`, bare `import '...'`, and dynamic `import('...')`, kept
/// to relative specifiers only.
fn extract_relative_imports(content: &str) -> Vec<RelativeImport> {
    let from_re =
        Regex::new(r#"(?m)^\s*import\s+(?:(\w+)\s*,?\s*)?(?:\{[^}]*\}\s*)?(?:from\s+)?['"](\.[^'"]+)['"]"#)
            .unwrap();
    let dynamic_re = Regex::new(r#"import\(\s*['"](\.[^'"]+)['"]\s*\)"#).unwrap();

    let mut out = Vec::new();
    for cap in from_re.captures_iter(content) {
        out.push(RelativeImport {
            specifier: cap[2].to_string(),
            default_binding: cap.get(1).map(|m| m.as_str().to_string()),
        });
    }
    for cap in dynamic_re.captures_iter(content) {
        out.push(RelativeImport {
            specifier: cap[1].to_string(),
            default_binding: None,
        });
    }
    out
}

/// Join a relative specifier onto the importer's directory, normalizing
/// `.` and `..`. Returns `None` when the result would climb above the
/// project root.
fn resolve_relative(importer_dir: &str, specifier: &str) -> Option<String> {
    let mut segments: Vec<&str> = importer_dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in specifier.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return None;
                }
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

/// Candidate on-disk paths for a resolved specifier: explicit source
/// extension as-is, otherwise each source extension, then the
/// directory-index fallback.
fn candidate_paths(resolved: &str) -> Vec<String> {
    if has_source_extension(resolved) {
        return vec![resolved.to_string()];
    }
    let mut out: Vec<String> = SOURCE_EXTENSIONS
        .iter()
        .map(|ext| format!("{}.{}", resolved, ext))
        .collect();
    out.extend(
        SOURCE_EXTENSIONS
            .iter()
            .map(|ext| format!("{}/index.{}", resolved, ext)),
    );
    out
}

/// Component-like stubs render a visible placeholder; anything else is a
/// plain empty default export.
fn render_stub(stub_path: &str, default_binding: Option<&str>) -> String {
    let component_name = default_binding
        .filter(|name| name.chars().next().is_some_and(|c| c.is_uppercase()))
        .map(str::to_string);
    let in_component_dir = stub_path
        .split('/')
        .any(|seg| COMPONENT_DIRS.contains(&seg));

    if component_name.is_some() || in_component_dir {
        let name = component_name.unwrap_or_else(|| {
            let base = crate::paths::basename(stub_path);
            let stem = base.split('.').next().unwrap_or("Placeholder");
            if stem.eq_ignore_ascii_case("index") {
                "Placeholder".to_string()
            } else {
                stem.to_string()
            }
        });
        format!(
            "export default function {name}() {{\n  return (\n    <div style={{{{ padding: '1rem', border: '1px dashed #999', color: '#999' }}}}>\n      {name} placeholder\n    </div>\n  )\n}}\n"
        )
    } else {
        "const placeholder = {}\n\nexport default placeholder\n".to_string()
    }
}
