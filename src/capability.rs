//! Backend capability discovery.
//!
//! Each optional backend is probed once, independently: a failing probe only
//! marks its own backend unavailable. The resulting [`CapabilityRecord`] is
//! immutable and injected into the exporter, so pipelines never re-probe and
//! tests can hand in any combination of flags.
//!
//! Tools installed or removed after the first probe are not noticed until
//! the process restarts.

use crate::backend::{PandocConverter, SoftwarePdfEngine, WkhtmltopdfEngine};
use crate::config::ExportConfig;
use crate::pipeline::html::markdown_to_html;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{info, warn};

static DETECTED: OnceLock<CapabilityRecord> = OnceLock::new();

/// Availability of one backend plus a human-readable detail: the version
/// string when available, the reason otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub available: bool,
    pub detail: String,
}

impl BackendStatus {
    pub fn available(detail: impl Into<String>) -> Self {
        Self {
            available: true,
            detail: detail.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            detail: reason.into(),
        }
    }
}

/// What this host can do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityRecord {
    /// In-process Markdown → HTML conversion.
    pub markdown_engine: BackendStatus,
    /// pandoc.
    pub docx_converter: BackendStatus,
    /// wkhtmltopdf.
    pub pdf_primary: BackendStatus,
    /// Software renderer.
    pub pdf_secondary: BackendStatus,
    /// First CJK font found, if any.
    pub cjk_font_path: Option<PathBuf>,
}

impl CapabilityRecord {
    /// Probe once per process and cache the result.
    ///
    /// Later calls return the cached record regardless of `config`.
    pub fn detect(config: &ExportConfig) -> &'static CapabilityRecord {
        DETECTED.get_or_init(|| Self::probe(config))
    }

    /// Run every probe now, without caching.
    pub fn probe(config: &ExportConfig) -> CapabilityRecord {
        let markdown_engine = report(
            "Markdown engine",
            guarded(|| {
                let html = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n");
                if html.contains("<table>") {
                    Ok("pulldown-cmark (GFM tables)".to_string())
                } else {
                    Err("table extension did not render".to_string())
                }
            }),
        );

        let docx_converter = report(
            "pandoc",
            PandocConverter::new(&config.pandoc_path)
                .version()
                .map_err(|e| e.to_string()),
        );

        let pdf_primary = report(
            "wkhtmltopdf",
            WkhtmltopdfEngine::new(&config.wkhtmltopdf_path)
                .version()
                .map_err(|e| e.to_string()),
        );

        let pdf_secondary = report(
            "software PDF renderer",
            guarded(|| {
                SoftwarePdfEngine::new()
                    .self_test()
                    .map(|()| "built-in".to_string())
                    .map_err(|e| e.to_string())
            }),
        );

        let cjk_font_path = config
            .font_path
            .clone()
            .filter(|p| {
                let ok = p.is_file();
                if !ok {
                    warn!("Configured font '{}' does not exist; searching system fonts", p.display());
                }
                ok
            })
            .or_else(cjk_fonts::locate_cjk_font);
        match &cjk_font_path {
            Some(p) => info!("CJK font: {}", p.display()),
            None => warn!("CJK font: none found; PDF fallback will use sans-serif"),
        }

        CapabilityRecord {
            markdown_engine,
            docx_converter,
            pdf_primary,
            pdf_secondary,
            cjk_font_path,
        }
    }

    /// A synthetic record; the Markdown engine is always available.
    pub fn from_flags(docx: bool, pdf_primary: bool, pdf_secondary: bool) -> Self {
        let status = |on: bool| {
            if on {
                BackendStatus::available("assumed available")
            } else {
                BackendStatus::unavailable("disabled")
            }
        };
        Self {
            markdown_engine: BackendStatus::available("assumed available"),
            docx_converter: status(docx),
            pdf_primary: status(pdf_primary),
            pdf_secondary: status(pdf_secondary),
            cjk_font_path: None,
        }
    }

    pub fn with_cjk_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.cjk_font_path = Some(path.into());
        self
    }

    pub fn markdown_engine_available(&self) -> bool {
        self.markdown_engine.available
    }

    pub fn docx_converter_available(&self) -> bool {
        self.docx_converter.available
    }

    pub fn pdf_renderer_primary_available(&self) -> bool {
        self.pdf_primary.available
    }

    pub fn pdf_renderer_secondary_available(&self) -> bool {
        self.pdf_secondary.available
    }

    /// Pretty JSON for diagnostics.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

/// Run an in-process probe, turning a panic into an unavailability reason.
fn guarded<F>(probe: F) -> Result<String, String>
where
    F: FnOnce() -> Result<String, String>,
{
    panic::catch_unwind(AssertUnwindSafe(probe)).unwrap_or_else(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "probe panicked".to_string());
        Err(msg)
    })
}

fn report(name: &str, result: Result<String, String>) -> BackendStatus {
    match result {
        Ok(detail) => {
            info!("{name}: available ({detail})");
            BackendStatus::available(detail)
        }
        Err(reason) => {
            warn!("{name}: unavailable ({reason})");
            BackendStatus::unavailable(reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_tools() -> ExportConfig {
        ExportConfig::builder()
            .pandoc_path("/nonexistent/pandoc")
            .wkhtmltopdf_path("/nonexistent/wkhtmltopdf")
            .build()
            .unwrap()
    }

    #[test]
    fn missing_tools_are_isolated() {
        let caps = CapabilityRecord::probe(&missing_tools());
        assert!(!caps.docx_converter_available());
        assert!(!caps.pdf_renderer_primary_available());
        assert!(caps.docx_converter.detail.contains("/nonexistent/pandoc"));
        // In-process probes are unaffected.
        assert!(caps.markdown_engine_available());
        assert!(caps.pdf_renderer_secondary_available());
    }

    #[test]
    fn configured_font_wins() {
        let dir = tempfile::tempdir().unwrap();
        let font = dir.path().join("custom.ttf");
        std::fs::write(&font, b"\x00\x01\x00\x00").unwrap();
        let config = ExportConfig::builder()
            .pandoc_path("/nonexistent/pandoc")
            .wkhtmltopdf_path("/nonexistent/wkhtmltopdf")
            .font_path(&font)
            .build()
            .unwrap();
        assert_eq!(CapabilityRecord::probe(&config).cjk_font_path, Some(font));
    }

    #[test]
    fn synthetic_flags() {
        let caps = CapabilityRecord::from_flags(false, true, false).with_cjk_font("/f.ttf");
        assert!(caps.markdown_engine_available());
        assert!(!caps.docx_converter_available());
        assert!(caps.pdf_renderer_primary_available());
        assert!(!caps.pdf_renderer_secondary_available());
        assert_eq!(caps.cjk_font_path, Some(PathBuf::from("/f.ttf")));
    }

    #[test]
    fn serializes_to_json() {
        let json = CapabilityRecord::from_flags(true, false, true).to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["docx_converter"]["available"], true);
        assert_eq!(value["pdf_primary"]["detail"], "disabled");
        assert!(value["cjk_font_path"].is_null());
    }

    #[test]
    fn panicking_probe_is_contained() {
        let result = guarded(|| panic!("boom"));
        assert_eq!(result, Err("boom".to_string()));
    }

    #[test]
    fn detect_is_cached() {
        let a = CapabilityRecord::detect(&missing_tools());
        let b = CapabilityRecord::detect(&ExportConfig::default());
        assert!(std::ptr::eq(a, b));
    }
}
