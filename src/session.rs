//! Per-sandbox session state.
//!
//! The caches that used to hang off ambient global scope in earlier
//! designs live here instead: the set of project files already seen and
//! the installed-package cache. One session serves one sandbox; the
//! apply pipeline takes it `&mut`, which excludes concurrent runs
//! against the same sandbox by construction.

use std::collections::HashSet;

use crate::config::EngineConfig;
use crate::paths::TemplateTarget;
use crate::pkg_cache::PackageInstallCache;
use crate::sandbox::SandboxInfo;

/// Mutable state scoped to one sandbox, carried across sequential runs.
#[derive(Debug)]
pub struct SandboxSession {
    pub sandbox_id: String,
    pub template_target: TemplateTarget,
    /// Project-relative paths known to exist in the sandbox.
    known_files: HashSet<String>,
    pub packages: PackageInstallCache,
}

impl SandboxSession {
    pub fn new(info: &SandboxInfo, config: &EngineConfig) -> Self {
        let mut packages = PackageInstallCache::new();
        packages.seed(&info.sandbox_id, &config.base_packages);
        Self {
            sandbox_id: info.sandbox_id.clone(),
            template_target: info.template_target,
            known_files: HashSet::new(),
            packages,
        }
    }

    /// Replace the known-file set with a fresh sandbox listing.
    pub fn refresh_known_files(&mut self, files: impl IntoIterator<Item = String>) {
        self.known_files = files.into_iter().collect();
    }

    /// Record a file the pipeline just wrote.
    pub fn note_file(&mut self, path: &str) {
        self.known_files.insert(path.to_string());
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.known_files.contains(path)
    }

    pub fn known_files(&self) -> &HashSet<String> {
        &self.known_files
    }
}
