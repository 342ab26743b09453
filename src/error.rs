//! Error types for the report-export library.
//!
//! Three distinct types reflect three distinct failure modes:
//!
//! * [`ExportError`]: **Fatal**: no artifact can be produced (no backend
//!   installed, every eligible backend failed). Returned as
//!   `Err(ExportError)` from the `render_*` / `export*` entry points.
//!
//! * [`BackendError`]: a single backend invocation failed. Inside a
//!   fallback-eligible pipeline it is caught and recorded; it only reaches the
//!   caller wrapped in [`ExportError::ConversionFailure`].
//!
//! * [`PostProcessingWarning`]: **Non-fatal**: the artifact was produced but
//!   a correction step (direction fix, font substitution) did not apply.
//!   Stored on [`crate::output::ExportArtifact`] so callers can surface
//!   degraded quality without losing the document.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the report-export library.
#[derive(Debug, Error)]
pub enum ExportError {
    // ── Capability errors ─────────────────────────────────────────────────
    /// No backend able to satisfy the request is installed or configured.
    #[error("{format} export unavailable: {}\n{hint}", join_reasons(.reasons))]
    BackendUnavailable {
        format: &'static str,
        reasons: Vec<Unavailable>,
        hint: String,
    },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// Every eligible backend was invoked and failed.
    #[error("{format} conversion failed: {}", join_attempts(.attempts))]
    ConversionFailure {
        format: &'static str,
        attempts: Vec<FailedAttempt>,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create a scoped temporary directory or read a backend output.
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExportError {
    /// `true` for [`ExportError::BackendUnavailable`].
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ExportError::BackendUnavailable { .. })
    }

    /// `true` when every attempted backend was killed at its deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            ExportError::ConversionFailure { attempts, .. } => {
                !attempts.is_empty()
                    && attempts
                        .iter()
                        .all(|a| matches!(a.error, BackendError::Timeout { .. }))
            }
            _ => false,
        }
    }
}

/// A backend skipped because its capability flag is false.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unavailable {
    pub backend: &'static str,
    pub reason: String,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.backend, self.reason)
    }
}

/// A backend that was attempted and failed.
#[derive(Debug)]
pub struct FailedAttempt {
    pub backend: &'static str,
    pub error: BackendError,
}

impl fmt::Display for FailedAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.error)
    }
}

fn join_reasons(reasons: &[Unavailable]) -> String {
    reasons
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_attempts(attempts: &[FailedAttempt]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; then ")
}

/// Failure of one backend invocation.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend process could not be started.
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The backend process exited unsuccessfully.
    #[error("'{program}' exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    /// The backend process ran past its deadline and was killed.
    #[error("'{program}' killed after {after:?} without finishing")]
    Timeout { program: String, after: Duration },

    /// The backend reported success but produced nothing usable.
    #[error("produced no output{}", .0.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    EmptyOutput(Option<String>),

    /// An in-process renderer failed.
    #[error("render error: {0}")]
    Render(String),

    /// Reading inputs or outputs of the backend failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-fatal degradation of an otherwise successful export.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PostProcessingWarning {
    /// The DOCX direction correction could not be applied.
    #[error("text-direction correction skipped: {detail}")]
    DirectionFixFailed { detail: String },

    /// No CJK font was found; CJK glyphs may render as boxes.
    #[error("no CJK font found, using generic sans-serif; CJK text may show missing glyphs")]
    CjkFontMissing,

    /// A CJK font was found but could not be loaded.
    #[error("CJK font '{path}' could not be loaded: {detail}")]
    CjkFontUnusable { path: String, detail: String },
}
