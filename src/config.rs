//! Engine configuration.
//!
//! Loaded from an optional YAML file; every field has a default matching
//! the conventional vite-style scaffold so a missing or partial config
//! still yields a working engine.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::EngineError;
use crate::paths::TemplateTarget;

/// Tunable engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Default project template when the sandbox does not report one.
    pub template_target: TemplateTarget,
    /// Automatic retries per ticket before it stays `failed`.
    pub max_ticket_retries: u32,
    /// Packages assumed present in every fresh sandbox (never installed).
    pub base_packages: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            template_target: TemplateTarget::SinglePageApp,
            max_ticket_retries: 2,
            base_packages: vec![
                "react".to_string(),
                "react-dom".to_string(),
                "vite".to_string(),
            ],
        }
    }
}

impl EngineConfig {
    /// Load from a YAML file, falling back to defaults when the file is
    /// absent. An unreadable or malformed file is an error, not a default.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}
