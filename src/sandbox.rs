//! Sandbox capability interface.
//!
//! The engine reaches the outside world only through this narrow trait:
//! file I/O, command execution, package installation, and identity. The
//! provided [`DirSandbox`] backs it with a plain local directory so the
//! engine is runnable and testable end-to-end; a remote microVM provider
//! implements the same trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::engine_err;
use crate::error::EngineError;
use crate::paths::TemplateTarget;

/// Result of one shell command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Result of one package-install request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallResult {
    pub success: bool,
    pub installed_packages: Vec<String>,
}

/// Identity and template of a live sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxInfo {
    pub sandbox_id: String,
    pub template_target: TemplateTarget,
}

/// The narrow surface the write pipeline consumes.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), EngineError>;
    async fn read_file(&self, path: &str) -> Result<String, EngineError>;
    async fn run_command(&self, cmd: &str) -> Result<CommandOutput, EngineError>;
    async fn list_files(&self) -> Result<Vec<String>, EngineError>;
    async fn install_packages(&self, names: &[String]) -> Result<InstallResult, EngineError>;
    /// `None` means the sandbox is not reachable; a run must not start.
    fn sandbox_info(&self) -> Option<SandboxInfo>;
}

// =============================================================================
// LOCAL DIRECTORY IMPLEMENTATION
// =============================================================================

/// Sandbox backed by a local project directory.
///
/// Package installs are recorded into the project manifest rather than
/// fetched; commands run through the system shell with the project root
/// as working directory.
pub struct DirSandbox {
    root: PathBuf,
    id: String,
    template_target: TemplateTarget,
}

/// Directories never reported by `list_files`.
const SKIP_DIRS: &[&str] = &["node_modules", ".git", "dist", ".cache"];

impl DirSandbox {
    pub fn new(root: impl Into<PathBuf>, template_target: TemplateTarget) -> Self {
        let root = root.into();
        let id = format!("dir-{}", root.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "sandbox".to_string()));
        Self { root, id, template_target }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a project-relative path, rejecting absolute paths and any
    /// traversal out of the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, EngineError> {
        let rel = Path::new(path);
        if rel.is_absolute() {
            return Err(engine_err!(PathInvalid, "absolute path not allowed: {}", path));
        }
        for component in rel.components() {
            if matches!(component, Component::ParentDir) {
                return Err(engine_err!(PathOutsideRoot, "path escapes project root: {}", path));
            }
        }
        Ok(self.root.join(rel))
    }

    fn walk(&self, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_dir() {
                if SKIP_DIRS.contains(&name.as_str()) {
                    continue;
                }
                self.walk(&path, out)?;
            } else if let Ok(rel) = path.strip_prefix(&self.root) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Sandbox for DirSandbox {
    async fn write_file(&self, path: &str, content: &str) -> Result<(), EngineError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::from_error(crate::error::ErrorCode::SandboxWriteFailed, e))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| EngineError::from_error(crate::error::ErrorCode::SandboxWriteFailed, e))
    }

    async fn read_file(&self, path: &str) -> Result<String, EngineError> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| EngineError::from_error(crate::error::ErrorCode::SandboxReadFailed, e))
    }

    async fn run_command(&self, cmd: &str) -> Result<CommandOutput, EngineError> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .current_dir(&self.root)
            .output()
            .await
            .map_err(|e| EngineError::from_error(crate::error::ErrorCode::SandboxCommandFailed, e))?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn list_files(&self) -> Result<Vec<String>, EngineError> {
        if !self.root.exists() {
            return Err(engine_err!(SandboxUnavailable, "project root does not exist"));
        }
        let mut out = Vec::new();
        self.walk(&self.root, &mut out)
            .map_err(|e| EngineError::from_error(crate::error::ErrorCode::SandboxReadFailed, e))?;
        out.sort();
        Ok(out)
    }

    async fn install_packages(&self, names: &[String]) -> Result<InstallResult, EngineError> {
        if names.is_empty() {
            return Ok(InstallResult { success: true, installed_packages: vec![] });
        }
        // Record into the manifest; actual fetching is the dev server's
        // concern when it next restarts.
        let manifest_path = self.root.join("package.json");
        let mut manifest: serde_json::Value = if manifest_path.exists() {
            let content = tokio::fs::read_to_string(&manifest_path)
                .await
                .map_err(|e| EngineError::from_error(crate::error::ErrorCode::SandboxInstallFailed, e))?;
            serde_json::from_str(&content)
                .map_err(|e| EngineError::from_error(crate::error::ErrorCode::SandboxInstallFailed, e))?
        } else {
            serde_json::json!({ "name": "generated-app", "private": true, "dependencies": {} })
        };

        let deps = manifest
            .as_object_mut()
            .and_then(|m| {
                m.entry("dependencies")
                    .or_insert_with(|| serde_json::json!({}))
                    .as_object_mut()
            })
            .ok_or_else(|| engine_err!(SandboxInstallFailed, "malformed package.json"))?;
        for name in names {
            deps.entry(name.clone()).or_insert_with(|| serde_json::json!("latest"));
        }

        let rendered = serde_json::to_string_pretty(&manifest)
            .map_err(|e| EngineError::from_error(crate::error::ErrorCode::SandboxInstallFailed, e))?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| EngineError::from_error(crate::error::ErrorCode::SandboxInstallFailed, e))?;
        tokio::fs::write(&manifest_path, rendered)
            .await
            .map_err(|e| EngineError::from_error(crate::error::ErrorCode::SandboxInstallFailed, e))?;

        Ok(InstallResult { success: true, installed_packages: names.to_vec() })
    }

    fn sandbox_info(&self) -> Option<SandboxInfo> {
        if !self.root.exists() {
            return None;
        }
        Some(SandboxInfo {
            sandbox_id: self.id.clone(),
            template_target: self.template_target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox(tmp: &TempDir) -> DirSandbox {
        DirSandbox::new(tmp.path(), TemplateTarget::SinglePageApp)
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let sb = sandbox(&tmp);
        sb.write_file("src/App.jsx", "export default 1").await.unwrap();
        let content = sb.read_file("src/App.jsx").await.unwrap();
        assert_eq!(content, "export default 1");
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let tmp = TempDir::new().unwrap();
        let sb = sandbox(&tmp);
        let err = sb.write_file("../evil.txt", "x").await.unwrap_err();
        assert_eq!(err.category, "path");
    }

    #[tokio::test]
    async fn test_list_files_skips_node_modules() {
        let tmp = TempDir::new().unwrap();
        let sb = sandbox(&tmp);
        sb.write_file("src/a.js", "1").await.unwrap();
        sb.write_file("node_modules/react/index.js", "2").await.unwrap();
        let files = sb.list_files().await.unwrap();
        assert_eq!(files, vec!["src/a.js"]);
    }

    #[tokio::test]
    async fn test_install_merges_manifest() {
        let tmp = TempDir::new().unwrap();
        let sb = sandbox(&tmp);
        let result = sb
            .install_packages(&["axios".to_string(), "zustand".to_string()])
            .await
            .unwrap();
        assert!(result.success);
        let manifest = sb.read_file("package.json").await.unwrap();
        assert!(manifest.contains("axios"));
        assert!(manifest.contains("zustand"));
    }

    #[tokio::test]
    async fn test_run_command() {
        let tmp = TempDir::new().unwrap();
        let sb = sandbox(&tmp);
        let out = sb.run_command("printf hello").await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout, "hello");
    }

    #[test]
    fn test_missing_root_reports_unavailable() {
        let sb = DirSandbox::new("/definitely/not/here", TemplateTarget::SinglePageApp);
        assert!(sb.sandbox_info().is_none());
    }
}
