//! DOCX pipeline: converter invocation followed by direction correction.
//!
//! The converter writes into a scoped [`TempDir`] that is removed on every
//! exit path. A failing direction fix never fails the export: the
//! uncorrected document is returned with a
//! [`PostProcessingWarning::DirectionFixFailed`].

use super::direction::fix_docx_direction;
use super::Rendered;
use crate::backend::DocumentConverter;
use crate::capability::CapabilityRecord;
use crate::config::DocxOptions;
use crate::error::{
    BackendError, ExportError, FailedAttempt, PostProcessingWarning, Unavailable,
};
use tempfile::TempDir;
use tracing::{debug, info, warn};

const FORMAT: &str = "DOCX";

/// Remediation shown when the converter is missing.
pub const PANDOC_HINT: &str = "Install pandoc (https://pandoc.org/installing.html) \
     or point REPORT_EXPORT_PANDOC / ExportConfig::pandoc_path at an existing binary.";

/// Convert sanitized Markdown to a DOCX package.
pub fn render_docx(
    markdown: &str,
    caps: &CapabilityRecord,
    converter: &dyn DocumentConverter,
    options: &DocxOptions,
) -> Result<Rendered, ExportError> {
    if !caps.docx_converter_available() {
        return Err(ExportError::BackendUnavailable {
            format: FORMAT,
            reasons: vec![Unavailable {
                backend: converter.name(),
                reason: caps.docx_converter.detail.clone(),
            }],
            hint: PANDOC_HINT.to_string(),
        });
    }

    let dir = TempDir::new().map_err(|source| ExportError::Io {
        path: std::env::temp_dir(),
        source,
    })?;
    let output = dir.path().join("report.docx");
    debug!("DOCX: converting {} bytes of Markdown via {}", markdown.len(), converter.name());

    let failed = |error: BackendError| ExportError::ConversionFailure {
        format: FORMAT,
        attempts: vec![FailedAttempt {
            backend: converter.name(),
            error,
        }],
    };

    converter.convert(markdown, options, &output).map_err(failed)?;

    let bytes = match std::fs::read(&output) {
        Ok(b) if !b.is_empty() => b,
        Ok(_) => return Err(failed(BackendError::EmptyOutput(None))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(failed(BackendError::EmptyOutput(Some("no output file".into()))))
        }
        Err(e) => return Err(failed(e.into())),
    };

    let mut warnings = Vec::new();
    let bytes = match fix_docx_direction(&bytes) {
        Ok((fixed, 0)) => fixed,
        Ok((fixed, removed)) => {
            info!("DOCX: removed {removed} text-direction overrides");
            fixed
        }
        Err(e) => {
            warn!("DOCX: direction fix failed, returning uncorrected document: {e}");
            warnings.push(PostProcessingWarning::DirectionFixFailed {
                detail: e.to_string(),
            });
            bytes
        }
    };

    Ok(Rendered {
        bytes,
        backend: converter.name(),
        warnings,
    })
}
