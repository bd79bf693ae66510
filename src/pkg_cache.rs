//! Per-sandbox installed-package cache.
//!
//! A multi-ticket build requests the same dependencies over and over;
//! this cache is the only thing preventing O(tickets) redundant installs.
//! Entries are append-only for the lifetime of a sandbox and seeded with
//! the runtime's always-present packages.

use std::collections::{HashMap, HashSet};

/// `sandboxId -> set(packageName)`.
#[derive(Debug, Default, Clone)]
pub struct PackageInstallCache {
    sandboxes: HashMap<String, HashSet<String>>,
}

/// The outcome of partitioning one install request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPartition {
    /// Skipped, reported separately for observability.
    pub already_installed: Vec<String>,
    /// Sent to the external installer.
    pub to_install: Vec<String>,
}

impl PackageInstallCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a sandbox with its always-present runtime packages. Idempotent.
    pub fn seed(&mut self, sandbox_id: &str, base_packages: &[String]) {
        let entry = self.sandboxes.entry(sandbox_id.to_string()).or_default();
        for pkg in base_packages {
            entry.insert(pkg.clone());
        }
    }

    pub fn should_install(&self, sandbox_id: &str, package: &str) -> bool {
        !self
            .sandboxes
            .get(sandbox_id)
            .map(|set| set.contains(package))
            .unwrap_or(false)
    }

    /// Merge an installed set into the cache after a successful install.
    pub fn mark_installed(&mut self, sandbox_id: &str, packages: &[String]) {
        let entry = self.sandboxes.entry(sandbox_id.to_string()).or_default();
        for pkg in packages {
            entry.insert(pkg.clone());
        }
    }

    /// Split a request into cached and to-install halves, preserving
    /// request order in both.
    pub fn partition(&self, sandbox_id: &str, requested: &[String]) -> InstallPartition {
        let mut already_installed = Vec::new();
        let mut to_install = Vec::new();
        for pkg in requested {
            if self.should_install(sandbox_id, pkg) {
                to_install.push(pkg.clone());
            } else {
                already_installed.push(pkg.clone());
            }
        }
        InstallPartition { already_installed, to_install }
    }
}
