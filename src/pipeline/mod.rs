//! Export pipeline stages.
//!
//! Each submodule implements exactly one transformation step, so every stage
//! is testable on its own and backends can be swapped without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! ReportDocument ──▶ assemble ──▶ Markdown ─────────────────────────────▶ .md
//!                                    │
//!                                    ▼
//!                                 sanitize ──▶ docx (pandoc ─▶ direction fix) ─▶ .docx
//!                                    │
//!                                    └──────▶ pdf ─┬▶ html::render_html ─▶ wkhtmltopdf
//!                                                  └▶ html::render_standalone_html ─▶ software
//! ```
//!
//! 1. [`assemble`]: deterministic Markdown from a report document
//! 2. [`sanitize`]: strip constructs known to break converters
//! 3. [`html`]: Markdown → styled HTML for the PDF engines
//! 4. [`docx`]: converter invocation plus [`direction`] correction
//! 5. [`pdf`]: ordered candidate list with single-level fallback

pub mod assemble;
pub mod direction;
pub mod docx;
pub mod html;
pub mod pdf;
pub mod sanitize;

use crate::error::PostProcessingWarning;

/// Bytes produced by a binary pipeline.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub bytes: Vec<u8>,
    /// Backend that produced `bytes`.
    pub backend: &'static str,
    pub warnings: Vec<PostProcessingWarning>,
}
