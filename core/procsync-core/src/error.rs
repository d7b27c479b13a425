//! Error types for procsync-core operations.
//!
//! Most failures never leave the module that hits them: query and parse
//! errors are logged and converted to benign defaults (stopped status, empty
//! port list). `SyncError` is what remains for callers that need to act.

use std::path::PathBuf;

use procsync_supervisor_protocol::ErrorInfo;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    // ─────────────────────────────────────────────────────────────────────
    // Supervisor Errors
    // ─────────────────────────────────────────────────────────────────────
    /// The supervisor could not be reached or did not answer in time.
    /// Retried by the next scheduled trigger, never fatal.
    #[error("Process supervisor unavailable: {0}")]
    SupervisorUnavailable(String),

    #[error("Process not found in supervisor: {0}")]
    ProcessNotFound(String),

    #[error("Supervisor rejected request: {0}")]
    SupervisorRejected(ErrorInfo),

    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Port Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Malformed port evidence in {path}: {details}")]
    MalformedEvidence { path: PathBuf, details: String },

    #[error("No free port within {window} ports above {port}")]
    PortExhausted { port: u16, window: u16 },

    /// The port comes from a framework config, which env files cannot override.
    #[error("Port {port} is set in {path}; change it there")]
    PortPinned { port: u16, path: PathBuf },

    #[error("Moved port to {expected}, but the project still resolves to {actual:?}")]
    PortNotApplied { expected: u16, actual: Option<u16> },

    // ─────────────────────────────────────────────────────────────────────
    // Project Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project already registered: {0}")]
    ProjectAlreadyRegistered(String),

    #[error("Invalid project path: {path}: {reason}")]
    InvalidProjectPath { path: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration / I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SyncError {
    /// Whether the failure is worth retrying on the next trigger.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::SupervisorUnavailable(_))
    }
}

impl From<ErrorInfo> for SyncError {
    fn from(info: ErrorInfo) -> Self {
        SyncError::SupervisorRejected(info)
    }
}

/// Convenience type alias for Results using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;

impl From<SyncError> for String {
    fn from(err: SyncError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        assert!(SyncError::SupervisorUnavailable("timeout".into()).is_transient());
        assert!(!SyncError::ProcessNotFound("demo".into()).is_transient());
        assert!(!SyncError::PortExhausted {
            port: 3000,
            window: 100
        }
        .is_transient());
    }

    #[test]
    fn protocol_errors_convert_to_rejections() {
        let err: SyncError = ErrorInfo::new("missing_field", "cwd is required").into();
        assert!(err.to_string().contains("cwd is required"));
    }
}
