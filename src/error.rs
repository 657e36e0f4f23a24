use serde::Serialize;
use std::fmt;

/// Severity for errors surfaced across component boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Fatal,
}

impl Severity {
    /// LOW and MEDIUM errors are locally recoverable; HIGH/FATAL are not.
    pub fn recoverable(self) -> bool {
        matches!(self, Severity::Low | Severity::Medium)
    }
}

/// A structured error surfaced to clients or logged, carrying the shape
/// required by the wire `error {code}` response.
#[derive(Debug, Clone, Serialize)]
pub struct SurfaceError {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    pub recoverable: bool,
    pub details: serde_json::Value,
}

impl SurfaceError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        let recoverable = severity.recoverable();
        SurfaceError {
            code: code.into(),
            message: message.into(),
            severity,
            recoverable,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

impl fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}): {}", self.code, self.severity, self.message)
    }
}

impl std::error::Error for SurfaceError {}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to open capture device: {0}")]
    Open(String),
    #[error("frame read failed: {0}")]
    Read(String),
    #[error("capture worker did not join within the shutdown timeout")]
    JoinTimeout,
}

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),
    #[error("resize target is degenerate: {0}x{1}")]
    DegenerateSize(u32, u32),
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to load hand-landmark model: {0}")]
    ModelLoad(String),
    #[error("extraction failed on frame {0}")]
    Inference(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("no active classifier registered")]
    NoActive,
    #[error("classifier '{0}' is not registered")]
    NotFound(String),
    #[error("cannot unregister active classifier '{0}'; switch first")]
    ActiveInUse(String),
    #[error("a classifier named '{0}' is already registered")]
    DuplicateName(String),
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("session '{0}' not found")]
    SessionNotFound(String),
    #[error("project '{0}' not found")]
    ProjectNotFound(String),
    #[error("send to session '{0}' failed: {1}")]
    SendFailed(String, String),
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("invalid transition from {from:?} via {action}")]
    InvalidTransition { from: String, action: String },
    #[error("fatal error: {0}")]
    Fatal(String),
}
