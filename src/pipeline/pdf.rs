//! PDF pipeline: an ordered candidate list with single-level fallback.
//!
//! ```text
//! [primary: HTML template → wkhtmltopdf] ──fails──▶ [secondary: standalone HTML → software renderer]
//! ```
//!
//! A candidate whose capability flag is false is skipped without being
//! invoked. The first candidate returning non-empty bytes wins. Outcomes:
//!
//! | attempted | result                                   |
//! |-----------|------------------------------------------|
//! | none      | `BackendUnavailable` with every reason   |
//! | ≥ 1, all failed | `ConversionFailure` with every attempt |

use super::html::{render_html, render_standalone_html};
use super::Rendered;
use crate::backend::PdfEngine;
use crate::capability::CapabilityRecord;
use crate::config::PageSetup;
use crate::error::{
    BackendError, ExportError, FailedAttempt, PostProcessingWarning, Unavailable,
};
use cjk_fonts::FontData;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const FORMAT: &str = "PDF";

/// Remediation shown when no PDF engine is usable.
pub const PDF_HINT: &str = "Install wkhtmltopdf (https://wkhtmltopdf.org/downloads.html) \
     or point REPORT_EXPORT_WKHTMLTOPDF / ExportConfig::wkhtmltopdf_path at an existing binary.";

/// One way of producing a PDF from sanitized Markdown.
pub trait PdfCandidate {
    fn name(&self) -> &'static str;

    /// `Err(reason)` when the capability record rules this candidate out.
    fn availability(&self, caps: &CapabilityRecord) -> Result<(), String>;

    /// Produce PDF bytes, recording non-fatal degradations in `warnings`.
    fn attempt(
        &self,
        markdown: &str,
        warnings: &mut Vec<PostProcessingWarning>,
    ) -> Result<Vec<u8>, BackendError>;
}

// ── Primary ──────────────────────────────────────────────────────────────

/// Print template rendered by an external engine.
pub struct PrimaryCandidate<'a> {
    pub engine: &'a dyn PdfEngine,
    pub title: &'a str,
    pub lang: &'a str,
    pub page: &'a PageSetup,
}

impl PdfCandidate for PrimaryCandidate<'_> {
    fn name(&self) -> &'static str {
        self.engine.name()
    }

    fn availability(&self, caps: &CapabilityRecord) -> Result<(), String> {
        if caps.pdf_renderer_primary_available() {
            Ok(())
        } else {
            Err(caps.pdf_primary.detail.clone())
        }
    }

    fn attempt(&self, markdown: &str, _: &mut Vec<PostProcessingWarning>) -> Result<Vec<u8>, BackendError> {
        let html = render_html(markdown, self.title, self.lang, self.page);
        self.engine.render(&html, self.page)
    }
}

// ── Secondary ────────────────────────────────────────────────────────────

/// Self-contained document rendered in-process, with CJK font substitution.
pub struct SecondaryCandidate<'a> {
    pub engine: &'a dyn PdfEngine,
    /// Located CJK font, if any.
    pub font: Option<PathBuf>,
    pub page: &'a PageSetup,
}

impl SecondaryCandidate<'_> {
    /// Load the located font once; the engine gets the loaded bytes.
    fn usable_font(&self, warnings: &mut Vec<PostProcessingWarning>) -> Option<FontData> {
        let Some(path) = &self.font else {
            warn!("PDF: no CJK font found; CJK text may render as missing glyphs");
            warnings.push(PostProcessingWarning::CjkFontMissing);
            return None;
        };
        match cjk_fonts::load_font(path) {
            Ok(data) => {
                debug!("PDF: embedding CJK font {}", path.display());
                Some(data)
            }
            Err(e) => {
                warn!("PDF: CJK font unusable, falling back to sans-serif: {e}");
                warnings.push(PostProcessingWarning::CjkFontUnusable {
                    path: path.display().to_string(),
                    detail: e.to_string(),
                });
                None
            }
        }
    }
}

impl PdfCandidate for SecondaryCandidate<'_> {
    fn name(&self) -> &'static str {
        self.engine.name()
    }

    fn availability(&self, caps: &CapabilityRecord) -> Result<(), String> {
        if caps.pdf_renderer_secondary_available() {
            Ok(())
        } else {
            Err(caps.pdf_secondary.detail.clone())
        }
    }

    fn attempt(
        &self,
        markdown: &str,
        warnings: &mut Vec<PostProcessingWarning>,
    ) -> Result<Vec<u8>, BackendError> {
        let font = self.usable_font(warnings);
        let html =
            render_standalone_html(markdown, font.as_ref().map(|f| f.path.as_path()), self.page);
        self.engine.render_with_font(&html, self.page, font.as_ref())
    }
}

// ── Driver ───────────────────────────────────────────────────────────────

/// Try `candidates` in order and return the first success.
pub fn render_pdf(
    markdown: &str,
    caps: &CapabilityRecord,
    candidates: &[&dyn PdfCandidate],
) -> Result<Rendered, ExportError> {
    let mut skipped = Vec::new();
    let mut attempts = Vec::new();

    for candidate in candidates {
        let name = candidate.name();
        if let Err(reason) = candidate.availability(caps) {
            debug!("PDF: skipping {name}: {reason}");
            skipped.push(Unavailable {
                backend: name,
                reason,
            });
            continue;
        }

        let mut warnings = Vec::new();
        let error = match candidate.attempt(markdown, &mut warnings) {
            Ok(bytes) if !bytes.is_empty() => {
                info!("PDF: rendered {} bytes with {name}", bytes.len());
                return Ok(Rendered {
                    bytes,
                    backend: name,
                    warnings,
                });
            }
            Ok(_) => BackendError::EmptyOutput(None),
            Err(e) => e,
        };
        warn!("PDF: {name} failed: {error}");
        attempts.push(FailedAttempt {
            backend: name,
            error,
        });
    }

    if attempts.is_empty() {
        Err(ExportError::BackendUnavailable {
            format: FORMAT,
            reasons: skipped,
            hint: PDF_HINT.to_string(),
        })
    } else {
        Err(ExportError::ConversionFailure {
            format: FORMAT,
            attempts,
        })
    }
}
