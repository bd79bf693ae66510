//! Unified error system for the build orchestration engine.
//!
//! Errors serialize to JSON so stream consumers (a UI or a logger) can
//! display them with recovery hints.
//!
//! # Usage
//!
//! ```rust,ignore
//! use appforge::error::{EngineError, ErrorCode};
//! use appforge::engine_err;
//!
//! let err = EngineError::new(ErrorCode::SandboxUnavailable, "no sandbox info");
//! let err = engine_err!(TicketNotFound, "no ticket with id {}", "ticket-3");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes grouped by engine concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    // Parse errors (1xxx)
    ResponseEmpty = 1001,
    ResponseNoArtifacts = 1002,

    // Path errors (2xxx)
    PathOutsideRoot = 2001,
    PathInvalid = 2002,

    // Sandbox errors (3xxx)
    SandboxUnavailable = 3001,
    SandboxWriteFailed = 3002,
    SandboxReadFailed = 3003,
    SandboxCommandFailed = 3004,
    SandboxInstallFailed = 3005,

    // Plan errors (4xxx)
    TicketNotFound = 4001,
    TicketNotBuildable = 4002,
    DependencyCycle = 4003,
    PlanStuck = 4004,
    BuildInProgress = 4005,

    // Config errors (5xxx)
    ConfigInvalid = 5001,

    // IO errors (7xxx)
    FileNotFound = 7003,
    FilePermissionDenied = 7004,
    FileWriteFailed = 7005,

    Unknown = 0,
}

impl ErrorCode {
    /// Category name for this code.
    pub fn category(&self) -> &'static str {
        match (*self as u16) / 1000 {
            1 => "parse",
            2 => "path",
            3 => "sandbox",
            4 => "plan",
            5 => "config",
            7 => "io",
            _ => "unknown",
        }
    }

    /// Whether a run can usually continue past this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ErrorCode::SandboxUnavailable
                | ErrorCode::DependencyCycle
                | ErrorCode::ConfigInvalid
                | ErrorCode::PathOutsideRoot
                | ErrorCode::FilePermissionDenied
        )
    }

    /// Default recovery hints for this code.
    pub fn default_hints(&self) -> Vec<&'static str> {
        match self {
            ErrorCode::SandboxUnavailable => vec![
                "Check the sandbox is provisioned and reachable",
                "Re-create the sandbox and retry the build",
            ],
            ErrorCode::SandboxInstallFailed => vec![
                "Check the package name is spelled correctly",
                "Retry the ticket; the registry may have been unavailable",
            ],
            ErrorCode::DependencyCycle => vec![
                "Remove one dependency edge from the cycle",
                "Re-run planning with the cyclic tickets merged",
            ],
            ErrorCode::TicketNotBuildable => vec![
                "Wait for the ticket's dependencies to finish",
                "Skip a blocking ticket if it is not critical",
            ],
            ErrorCode::PlanStuck => vec![
                "Retry or skip a failed ticket to unblock its dependents",
            ],
            ErrorCode::FileNotFound => vec!["Check if the path is correct"],
            ErrorCode::FilePermissionDenied => {
                vec!["Check file permissions on the project root"]
            }
            _ => vec![],
        }
    }
}

/// Structured engine error.
///
/// Serializes to JSON for stream consumers; `error_id` is stable and
/// greppable (`AF-<code>`).
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("[{error_id}] {message}")]
pub struct EngineError {
    pub error_id: String,
    pub code: u16,
    pub category: String,
    pub message: String,
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery_hints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl EngineError {
    /// Create a new error with default hints.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let hints = code.default_hints();
        Self {
            error_id: format!("AF-{:04}", code as u16),
            code: code as u16,
            category: code.category().to_string(),
            message: message.into(),
            recoverable: code.is_recoverable(),
            recovery_hints: hints.into_iter().map(String::from).collect(),
            cause: None,
        }
    }

    /// Attach the original error message for debugging.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Create from a standard error, preserving it as cause.
    pub fn from_error<E: std::error::Error>(code: ErrorCode, error: E) -> Self {
        Self::new(code, error.to_string()).with_cause(format!("{:?}", error))
    }

    /// JSON rendering, falling back to the bare message.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }
}

/// Convenience macro for creating errors.
#[macro_export]
macro_rules! engine_err {
    ($code:ident, $msg:expr) => {
        $crate::error::EngineError::new($crate::error::ErrorCode::$code, $msg)
    };
    ($code:ident, $fmt:expr, $($arg:tt)*) => {
        $crate::error::EngineError::new(
            $crate::error::ErrorCode::$code,
            format!($fmt, $($arg)*)
        )
    };
}

// Hint lists vary with context; identity is code + message.
impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.message == other.message
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::from_error(ErrorCode::FileNotFound, e),
            std::io::ErrorKind::PermissionDenied => {
                EngineError::from_error(ErrorCode::FilePermissionDenied, e)
            }
            _ => EngineError::from_error(ErrorCode::FileWriteFailed, e),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::from_error(ErrorCode::ConfigInvalid, e)
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(e: serde_yaml::Error) -> Self {
        EngineError::from_error(ErrorCode::ConfigInvalid, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = EngineError::new(ErrorCode::SandboxInstallFailed, "registry timeout");
        assert_eq!(err.error_id, "AF-3005");
        assert_eq!(err.category, "sandbox");
        assert!(err.recoverable);
        assert!(!err.recovery_hints.is_empty());
    }

    #[test]
    fn test_error_serialization_roundtrip() {
        let err = EngineError::new(ErrorCode::DependencyCycle, "a -> b -> a");
        let json = serde_json::to_string(&err).unwrap();
        let parsed: EngineError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.error_id, "AF-4003");
        assert_eq!(parsed.category, "plan");
        assert!(!parsed.recoverable);
    }

    #[test]
    fn test_error_macro() {
        let err = engine_err!(TicketNotFound, "no ticket {}", "t-9");
        assert_eq!(err.error_id, "AF-4001");
        assert!(err.message.contains("t-9"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io_err.into();
        assert_eq!(err.code, ErrorCode::FileNotFound as u16);
    }
}
