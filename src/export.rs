//! Export entry points.
//!
//! [`ReportExporter`] owns the configuration, the capability record and the
//! backend set. It holds no mutable state, so one exporter can serve any
//! number of concurrent calls (clone it, or share it behind an `Arc`).
//!
//! Every call rebuilds the Markdown from the document; nothing is cached
//! between calls and nothing is written outside scoped temporary directories.

use crate::backend::Backends;
use crate::capability::CapabilityRecord;
use crate::config::ExportConfig;
use crate::document::ReportDocument;
use crate::error::ExportError;
use crate::output::{ArtifactContent, ExportArtifact, ExportFormat};
use crate::pipeline::pdf::{PdfCandidate, PrimaryCandidate, SecondaryCandidate};
use crate::pipeline::{assemble, docx, pdf, sanitize, Rendered};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ReportExporter {
    config: Arc<ExportConfig>,
    caps: Arc<CapabilityRecord>,
    backends: Backends,
}

impl ReportExporter {
    /// Exporter with real backends and the process-wide capability record.
    pub fn new(config: ExportConfig) -> Self {
        let caps = CapabilityRecord::detect(&config).clone();
        let backends = Backends::from_config(&config);
        Self::with_backends(config, caps, backends)
    }

    /// Exporter with an explicit capability record and backend set.
    pub fn with_backends(config: ExportConfig, caps: CapabilityRecord, backends: Backends) -> Self {
        Self {
            config: Arc::new(config),
            caps: Arc::new(caps),
            backends,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &CapabilityRecord {
        &self.caps
    }

    /// Canonical Markdown. Always available.
    pub fn render_markdown(&self, doc: &ReportDocument) -> String {
        assemble::assemble_markdown(doc, &self.config.labels)
    }

    /// DOCX bytes.
    ///
    /// # Errors
    /// `BackendUnavailable` without a converter; `ConversionFailure` when the
    /// converter fails or writes nothing.
    pub fn render_docx(&self, doc: &ReportDocument) -> Result<Vec<u8>, ExportError> {
        self.docx(doc).map(|r| r.bytes)
    }

    /// PDF bytes.
    ///
    /// # Errors
    /// `BackendUnavailable` when neither engine is usable; `ConversionFailure`
    /// when every attempted engine failed.
    pub fn render_pdf(&self, doc: &ReportDocument) -> Result<Vec<u8>, ExportError> {
        self.pdf(doc).map(|r| r.bytes)
    }

    /// Render `doc` as `format`, reporting the backend used and any warnings.
    pub fn export(
        &self,
        doc: &ReportDocument,
        format: ExportFormat,
    ) -> Result<ExportArtifact, ExportError> {
        let start = Instant::now();
        info!("Exporting {} report for {}", format, doc.stock_symbol);

        let artifact = match format {
            ExportFormat::Markdown => ExportArtifact {
                format,
                content: ArtifactContent::Text(self.render_markdown(doc)),
                backend: "markdown",
                warnings: Vec::new(),
            },
            ExportFormat::Docx => binary_artifact(format, self.docx(doc)?),
            ExportFormat::Pdf => binary_artifact(format, self.pdf(doc)?),
        };

        for w in &artifact.warnings {
            warn!("Export warning: {w}");
        }
        info!(
            "Exported {} bytes of {} via {} in {}ms",
            artifact.len(),
            format,
            artifact.backend,
            start.elapsed().as_millis()
        );
        Ok(artifact)
    }

    /// [`export`](Self::export) on tokio's blocking pool.
    ///
    /// External converters block, so async callers should use this. Each
    /// converter run is bounded by `backend_timeout_secs`.
    pub async fn export_async(
        &self,
        doc: ReportDocument,
        format: ExportFormat,
    ) -> Result<ExportArtifact, ExportError> {
        let exporter = self.clone();
        tokio::task::spawn_blocking(move || exporter.export(&doc, format))
            .await
            .map_err(|e| ExportError::Internal(format!("export task failed: {e}")))?
    }

    /// Export and write the artifact to `path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files. The
    /// temp file is removed again when the write or rename fails.
    /// Returns the artifact so callers can inspect backend and warnings.
    pub async fn export_to_file(
        &self,
        doc: ReportDocument,
        format: ExportFormat,
        path: impl AsRef<Path>,
    ) -> Result<ExportArtifact, ExportError> {
        let artifact = self.export_async(doc, format).await?;
        let path = path.as_ref();
        let io_err = |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp_path = path.with_extension(format!("{}.tmp", format.extension()));
        let written = match tokio::fs::write(&tmp_path, artifact.as_bytes()).await {
            Ok(()) => tokio::fs::rename(&tmp_path, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
                debug!("Could not remove {}: {cleanup}", tmp_path.display());
            }
            return Err(io_err(e));
        }

        Ok(artifact)
    }

    // ── Pipelines ────────────────────────────────────────────────────────

    fn sanitized(&self, doc: &ReportDocument) -> String {
        let markdown = self.render_markdown(doc);
        let clean = sanitize::sanitize(&markdown);
        debug!(
            "Sanitized Markdown: {} → {} bytes",
            markdown.len(),
            clean.len()
        );
        clean
    }

    fn docx(&self, doc: &ReportDocument) -> Result<Rendered, ExportError> {
        let markdown = self.sanitized(doc);
        docx::render_docx(
            &markdown,
            &self.caps,
            self.backends.converter.as_ref(),
            &self.config.docx,
        )
    }

    fn pdf(&self, doc: &ReportDocument) -> Result<Rendered, ExportError> {
        let markdown = self.sanitized(doc);
        let primary = PrimaryCandidate {
            engine: self.backends.primary_pdf.as_ref(),
            title: &self.config.document_title,
            lang: &self.config.docx.lang,
            page: &self.config.page,
        };
        let secondary = SecondaryCandidate {
            engine: self.backends.secondary_pdf.as_ref(),
            font: self.caps.cjk_font_path.clone(),
            page: &self.config.page,
        };
        let candidates: [&dyn PdfCandidate; 2] = [&primary, &secondary];
        pdf::render_pdf(&markdown, &self.caps, &candidates)
    }
}

fn binary_artifact(format: ExportFormat, rendered: Rendered) -> ExportArtifact {
    ExportArtifact {
        format,
        content: ArtifactContent::Binary(rendered.bytes),
        backend: rendered.backend,
        warnings: rendered.warnings,
    }
}
