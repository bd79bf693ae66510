//! Path normalization for AI-generated file paths.
//!
//! Maps a raw path from model output to its canonical project-relative
//! location for the active template, and drops generated configuration
//! files that must never overwrite project scaffolding.

use serde::{Deserialize, Serialize};

/// Structural convention of the target project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateTarget {
    /// Vite-style SPA: sources under `src/`, one HTML document at the root.
    SinglePageApp,
    /// Multi-route app: route-derived paths, no reparenting.
    MultiRouteApp,
}

/// Conventional source root for the single-page template.
pub const SOURCE_ROOT: &str = "src";
/// Static assets directory.
pub const PUBLIC_ROOT: &str = "public";
/// The HTML document the dev server serves first.
pub const HTML_ENTRY: &str = "index.html";

/// Scaffolding configuration the engine refuses to overwrite. Matched by
/// basename; generated copies of these are dropped entirely.
const CONFIG_DROP_LIST: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "vite.config.js",
    "vite.config.ts",
    "tailwind.config.js",
    "tailwind.config.ts",
    "postcss.config.js",
    "tsconfig.json",
    "tsconfig.node.json",
    "eslint.config.js",
];

/// Files that legitimately live at the project root and are never
/// reparented under the source root.
const ROOT_EXCEPTIONS: &[&str] = &[".env.example", ".gitignore", "README.md", "robots.txt"];

/// Map a raw path from model output to its canonical project-relative
/// path. Returns `None` when the file must not be written at all.
pub fn normalize_path(raw: &str, target: TemplateTarget) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let path = trimmed.strip_prefix('/').unwrap_or(trimmed).to_string();

    let basename = path.rsplit('/').next().unwrap_or(&path);
    if CONFIG_DROP_LIST.contains(&basename) {
        return None;
    }

    match target {
        TemplateTarget::MultiRouteApp => Some(path),
        TemplateTarget::SinglePageApp => {
            if path.starts_with(&format!("{}/", SOURCE_ROOT))
                || path.starts_with(&format!("{}/", PUBLIC_ROOT))
                || path == HTML_ENTRY
                || ROOT_EXCEPTIONS.contains(&path.as_str())
            {
                Some(path)
            } else {
                Some(format!("{}/{}", SOURCE_ROOT, path))
            }
        }
    }
}

/// Basename of a normalized path.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Directory portion of a normalized path, empty for root-level files.
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Number of directory separators; deeper files sort later.
pub fn depth(path: &str) -> usize {
    path.matches('/').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_leading_slash() {
        let p = normalize_path("/src/App.jsx", TemplateTarget::SinglePageApp).unwrap();
        assert_eq!(p, "src/App.jsx");
    }

    #[test]
    fn test_reparents_bare_component_under_src() {
        let p = normalize_path("components/Button.jsx", TemplateTarget::SinglePageApp).unwrap();
        assert_eq!(p, "src/components/Button.jsx");
    }

    #[test]
    fn test_html_entry_stays_at_root() {
        let p = normalize_path("index.html", TemplateTarget::SinglePageApp).unwrap();
        assert_eq!(p, "index.html");
    }

    #[test]
    fn test_root_exception_not_reparented() {
        let p = normalize_path(".env.example", TemplateTarget::SinglePageApp).unwrap();
        assert_eq!(p, ".env.example");
    }

    #[test]
    fn test_public_assets_not_reparented() {
        let p = normalize_path("public/favicon.svg", TemplateTarget::SinglePageApp).unwrap();
        assert_eq!(p, "public/favicon.svg");
    }

    #[test]
    fn test_config_files_dropped() {
        assert!(normalize_path("vite.config.js", TemplateTarget::SinglePageApp).is_none());
        assert!(normalize_path("src/tailwind.config.js", TemplateTarget::SinglePageApp).is_none());
        assert!(normalize_path("package.json", TemplateTarget::MultiRouteApp).is_none());
    }

    #[test]
    fn test_multi_route_paths_pass_through() {
        let p = normalize_path("app/routes/index.tsx", TemplateTarget::MultiRouteApp).unwrap();
        assert_eq!(p, "app/routes/index.tsx");
    }

    #[test]
    fn test_helpers() {
        assert_eq!(basename("src/components/Button.jsx"), "Button.jsx");
        assert_eq!(parent_dir("src/components/Button.jsx"), "src/components");
        assert_eq!(parent_dir("index.html"), "");
        assert_eq!(depth("src/components/Button.jsx"), 2);
    }
}
