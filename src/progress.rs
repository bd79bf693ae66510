//! Progress event stream schema.
//!
//! One apply run emits a strictly ordered sequence of these events
//! (start → packages → files → post-pass → commands → terminal), one
//! JSON object per event, suitable for an NDJSON live log. Every run
//! ends with exactly one `complete` or `error`; `complete` with a
//! non-empty `errors` list means partial success, not failure.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Summary carried by the terminal `complete` event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResults {
    pub files_created: Vec<String>,
    pub files_updated: Vec<String>,
    pub packages_installed: Vec<String>,
    pub packages_already_installed: Vec<String>,
    pub packages_failed: Vec<String>,
    pub commands_executed: Vec<String>,
    pub errors: Vec<String>,
}

/// One progress event. The `type` tag and field names match the wire
/// schema consumed by UI clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProgressEvent {
    Start {
        message: String,
        #[serde(rename = "totalFiles")]
        total_files: usize,
    },
    Info {
        message: String,
    },
    Step {
        message: String,
    },
    PackageProgress {
        message: String,
        current: usize,
        total: usize,
    },
    FileProgress {
        #[serde(rename = "fileName")]
        file_name: String,
        current: usize,
        total: usize,
    },
    FileComplete {
        #[serde(rename = "fileName")]
        file_name: String,
        /// "created" or "updated".
        action: String,
    },
    FileError {
        #[serde(rename = "fileName")]
        file_name: String,
        error: String,
    },
    CommandProgress {
        command: String,
        current: usize,
        total: usize,
    },
    CommandOutput {
        command: String,
        output: String,
    },
    CommandComplete {
        command: String,
        #[serde(rename = "exitCode")]
        exit_code: i32,
    },
    CommandError {
        command: String,
        error: String,
    },
    Warning {
        message: String,
    },
    Error {
        error: EngineError,
    },
    Complete {
        results: ApplyResults,
    },
}

impl ProgressEvent {
    /// True for the two events that may end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }

    /// One NDJSON line, newline excluded.
    pub fn to_ndjson_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"warning","message":"unserializable event"}"#.to_string())
    }
}
