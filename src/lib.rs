//! # report-export
//!
//! Export multi-section analysis reports to Markdown, DOCX and PDF on hosts
//! where the converters may or may not be installed.
//!
//! ## Why this crate?
//!
//! DOCX and PDF output depend on external tools (pandoc, wkhtmltopdf) that
//! are optional, differ between hosts, and each mishandle CJK text, page
//! breaks or text direction in their own way. This crate probes what is
//! available once, builds one canonical Markdown document, cleans it of
//! constructs known to break the converters, and falls back from the
//! external PDF engine to a built-in software renderer when needed.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ReportDocument
//!  │
//!  ├─ 1. Assemble  deterministic Markdown (fixed section order)
//!  ├─ 2. Sanitize  strip vertical-text tags, inline styles, <style> blocks
//!  ├─ 3a. DOCX     pandoc → strip w:bidi / w:textDirection from paragraphs
//!  └─ 3b. PDF      print HTML → wkhtmltopdf
//!                  └─ on failure: standalone HTML + CJK font → software renderer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use report_export::{ExportConfig, ExportFormat, ReportDocument, ReportExporter};
//!
//! let exporter = ReportExporter::new(ExportConfig::default());
//! let doc = ReportDocument::new("000001")
//!     .with_date("2025-01-15")
//!     .with_section("company_overview", "平安银行是一家股份制商业银行。");
//!
//! let markdown = exporter.render_markdown(&doc);
//! assert!(markdown.starts_with("# 000001"));
//!
//! match exporter.export(&doc, ExportFormat::Pdf) {
//!     Ok(artifact) => println!("{} bytes via {}", artifact.len(), artifact.backend),
//!     Err(e) => eprintln!("PDF export failed: {e}"),
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `report-export` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! report-export = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod capability;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{Backends, DocumentConverter, PdfEngine};
pub use capability::{BackendStatus, CapabilityRecord};
pub use config::{DocxOptions, ExportConfig, ExportConfigBuilder, PageSetup, PaperSize, ReportLabels};
pub use document::{ReportDocument, ResearchDepth, Sections, SECTION_ORDER};
pub use error::{BackendError, ExportError, FailedAttempt, PostProcessingWarning, Unavailable};
pub use export::ReportExporter;
pub use output::{ArtifactContent, ExportArtifact, ExportFormat};
pub use pipeline::sanitize::sanitize;
