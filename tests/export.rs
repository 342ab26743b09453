//! Integration tests for report-export.
//!
//! Most tests drive the exporter with fake backends and synthetic capability
//! records, so they run anywhere. Tests marked "real tool" use the host's
//! pandoc / wkhtmltopdf and skip themselves when the tool is missing.
//!
//! Run with:
//!   cargo test --test export -- --nocapture

use report_export::{
    BackendError, Backends, CapabilityRecord, DocumentConverter, DocxOptions, ExportConfig,
    ExportError, ExportFormat, PageSetup, PdfEngine, PostProcessingWarning, ReportDocument,
    ReportExporter,
};
use report_export::backend::SoftwarePdfEngine;
use report_export::pipeline::direction::DOCUMENT_XML;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

// ── Fake backends ────────────────────────────────────────────────────────────

/// Writes a DOCX whose paragraphs (including one in a table cell) carry
/// direction overrides.
#[derive(Default)]
struct FakePandoc {
    calls: AtomicUsize,
}

impl DocumentConverter for FakePandoc {
    fn name(&self) -> &'static str {
        "fake-pandoc"
    }

    fn convert(&self, markdown: &str, options: &DocxOptions, output: &Path) -> Result<(), BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" data-lang="{}"><w:body><w:p><w:pPr><w:bidi/></w:pPr><w:r><w:t>{} chars</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:pPr><w:textDirection w:val="tbRl"/><w:bidi/></w:pPr><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl></w:body></w:document>"#,
            options.lang,
            markdown.chars().count()
        );
        let zip_err = |e: zip::result::ZipError| BackendError::Render(e.to_string());
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("[Content_Types].xml", SimpleFileOptions::default())
            .map_err(zip_err)?;
        zip.write_all(b"<Types/>")?;
        zip.start_file(DOCUMENT_XML, SimpleFileOptions::default())
            .map_err(zip_err)?;
        zip.write_all(xml.as_bytes())?;
        let bytes = zip.finish().map_err(zip_err)?.into_inner();
        std::fs::write(output, bytes)?;
        Ok(())
    }
}

/// A PDF engine that counts calls and either fails or returns fixed bytes.
struct FakeEngine {
    name: &'static str,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeEngine {
    fn new(name: &'static str, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            fail,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PdfEngine for FakeEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn render(&self, _: &str, _: &PageSetup) -> Result<Vec<u8>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(BackendError::ExitStatus {
                program: self.name.into(),
                status: "exit status: 1".into(),
                stderr: "Exit with code 1 due to network error".into(),
            })
        } else {
            Ok(b"%PDF-1.4\n%fake\n".to_vec())
        }
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

fn sample() -> ReportDocument {
    serde_json::from_str(
        r#"{
            "stock_symbol": "000001",
            "analysis_date": "2025-01-15",
            "analysts": ["market", "fundamental"],
            "reports": {"company_overview": "Stable earnings.", "risk_analysis": ""}
        }"#,
    )
    .unwrap()
}

fn exporter(
    caps: CapabilityRecord,
    converter: Arc<dyn DocumentConverter>,
    primary: Arc<dyn PdfEngine>,
    secondary: Arc<dyn PdfEngine>,
) -> ReportExporter {
    ReportExporter::with_backends(
        ExportConfig::default(),
        caps,
        Backends {
            converter,
            primary_pdf: primary,
            secondary_pdf: secondary,
        },
    )
}

fn docx_part(bytes: &[u8], name: &str) -> String {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut s = String::new();
    archive.by_name(name).unwrap().read_to_string(&mut s).unwrap();
    s
}

/// Skip this test if `program --version` does not run.
macro_rules! skip_unless_installed {
    ($program:expr) => {{
        let ok = std::process::Command::new($program)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !ok {
            println!("SKIP: {} not installed", $program);
            return;
        }
    }};
}

// ── Markdown ─────────────────────────────────────────────────────────────────

#[test]
fn test_markdown_example_report() {
    let ex = exporter(
        CapabilityRecord::from_flags(false, false, false),
        Arc::new(FakePandoc::default()),
        FakeEngine::new("primary", false),
        FakeEngine::new("secondary", false),
    );
    let md = ex.render_markdown(&sample());
    assert!(md.contains("## 公司概况\n\nStable earnings.\n"));
    assert!(!md.contains("## 风险分析"));
    assert!(md.contains("**分析师**: market, fundamental"));
}

#[test]
fn test_markdown_is_pure() {
    let ex = exporter(
        CapabilityRecord::from_flags(false, false, false),
        Arc::new(FakePandoc::default()),
        FakeEngine::new("primary", false),
        FakeEngine::new("secondary", false),
    );
    let doc = sample().with_section("zeta_notes", "z").with_section("alpha_notes", "a");
    let first = ex.render_markdown(&doc);
    assert_eq!(first, ex.render_markdown(&doc));
    assert!(first.find("## zeta_notes").unwrap() < first.find("## alpha_notes").unwrap());

    let artifact = ex.export(&doc, ExportFormat::Markdown).unwrap();
    assert_eq!(artifact.as_text(), Some(first.as_str()));
    assert_eq!(artifact.backend, "markdown");
}

// ── DOCX ─────────────────────────────────────────────────────────────────────

#[test]
fn test_docx_has_no_direction_overrides() {
    let pandoc = Arc::new(FakePandoc::default());
    let ex = exporter(
        CapabilityRecord::from_flags(true, false, false),
        pandoc.clone(),
        FakeEngine::new("primary", false),
        FakeEngine::new("secondary", false),
    );
    let artifact = ex.export(&sample(), ExportFormat::Docx).unwrap();
    assert!(!artifact.is_empty());
    assert!(artifact.warnings.is_empty());
    assert_eq!(pandoc.calls.load(Ordering::SeqCst), 1);

    let xml = docx_part(artifact.as_bytes(), DOCUMENT_XML);
    assert!(!xml.contains("w:bidi"), "got {xml}");
    assert!(!xml.contains("w:textDirection"), "got {xml}");
    assert!(xml.contains("<w:t>cell</w:t>"));
    assert!(xml.contains(r#"data-lang="zh-CN""#));
    assert_eq!(docx_part(artifact.as_bytes(), "[Content_Types].xml"), "<Types/>");
}

#[test]
fn test_docx_unavailable_never_invokes_converter() {
    let pandoc = Arc::new(FakePandoc::default());
    let ex = exporter(
        CapabilityRecord::from_flags(false, true, true),
        pandoc.clone(),
        FakeEngine::new("primary", false),
        FakeEngine::new("secondary", false),
    );
    let err = ex.render_docx(&sample()).unwrap_err();
    assert!(err.is_unavailable());
    assert!(err.to_string().contains("Install pandoc"));
    assert_eq!(pandoc.calls.load(Ordering::SeqCst), 0);
}

// ── PDF ──────────────────────────────────────────────────────────────────────

#[test]
fn test_pdf_primary_skipped_when_unavailable() {
    let primary = FakeEngine::new("primary", false);
    let ex = exporter(
        CapabilityRecord::from_flags(false, false, true),
        Arc::new(FakePandoc::default()),
        primary.clone(),
        Arc::new(SoftwarePdfEngine::new()),
    );
    let artifact = ex.export(&sample(), ExportFormat::Pdf).unwrap();
    assert_eq!(primary.calls(), 0);
    assert_eq!(artifact.backend, "software");
    assert!(artifact.as_bytes().starts_with(b"%PDF"));
    assert!(artifact
        .warnings
        .contains(&PostProcessingWarning::CjkFontMissing));
}

#[test]
fn test_pdf_both_unavailable() {
    let primary = FakeEngine::new("primary", false);
    let secondary = FakeEngine::new("secondary", false);
    let ex = exporter(
        CapabilityRecord::from_flags(true, false, false),
        Arc::new(FakePandoc::default()),
        primary.clone(),
        secondary.clone(),
    );
    match ex.render_pdf(&sample()) {
        Err(ExportError::BackendUnavailable { reasons, hint, .. }) => {
            assert_eq!(reasons.len(), 2);
            assert!(hint.contains("wkhtmltopdf"));
        }
        other => panic!("expected BackendUnavailable, got {other:?}"),
    }
    assert_eq!(primary.calls() + secondary.calls(), 0);
}

#[test]
fn test_pdf_primary_failure_is_not_surfaced() {
    let primary = FakeEngine::new("primary", true);
    let secondary = FakeEngine::new("secondary", false);
    let ex = exporter(
        CapabilityRecord::from_flags(false, true, true),
        Arc::new(FakePandoc::default()),
        primary.clone(),
        secondary.clone(),
    );
    let bytes = ex.render_pdf(&sample()).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);
}

#[test]
fn test_pdf_all_attempts_fail() {
    let ex = exporter(
        CapabilityRecord::from_flags(false, true, true),
        Arc::new(FakePandoc::default()),
        FakeEngine::new("primary", true),
        FakeEngine::new("secondary", true),
    );
    let err = ex.render_pdf(&sample()).unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, ExportError::ConversionFailure { .. }));
    assert!(msg.contains("primary:"), "got {msg}");
    assert!(msg.contains("; then secondary:"), "got {msg}");
}

#[test]
fn test_pdf_unusable_font_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let font = dir.path().join("broken.ttc");
    std::fs::write(&font, b"ttcf").unwrap();
    let ex = exporter(
        CapabilityRecord::from_flags(false, false, true).with_cjk_font(&font),
        Arc::new(FakePandoc::default()),
        FakeEngine::new("primary", false),
        Arc::new(SoftwarePdfEngine::new()),
    );
    let artifact = ex.export(&sample(), ExportFormat::Pdf).unwrap();
    assert!(artifact.as_bytes().starts_with(b"%PDF"));
    assert!(matches!(
        artifact.warnings.as_slice(),
        [PostProcessingWarning::CjkFontUnusable { .. }]
    ));
}

#[test]
fn test_pdf_sanitizes_before_rendering() {
    struct Capture(std::sync::Mutex<String>);
    impl PdfEngine for Capture {
        fn name(&self) -> &'static str {
            "capture"
        }
        fn render(&self, html: &str, _: &PageSetup) -> Result<Vec<u8>, BackendError> {
            *self.0.lock().unwrap() = html.to_string();
            Ok(b"%PDF".to_vec())
        }
    }

    let capture = Arc::new(Capture(Default::default()));
    let ex = exporter(
        CapabilityRecord::from_flags(false, true, false),
        Arc::new(FakePandoc::default()),
        capture.clone(),
        FakeEngine::new("secondary", false),
    );
    let doc = ReportDocument::new("X").with_section(
        "market_analysis",
        "<div style=\"writing-mode: vertical-rl\">竖排</div>\n<p style=\"color:red\">red</p>",
    );
    ex.render_pdf(&doc).unwrap();
    let html = capture.0.lock().unwrap().clone();
    assert!(!html.contains("writing-mode: vertical"));
    assert!(!html.contains("color:red"));
    assert!(html.contains("red"));
}

// ── Async / file output ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_export_to_file_is_atomic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/report.md");
    let ex = exporter(
        CapabilityRecord::from_flags(false, false, false),
        Arc::new(FakePandoc::default()),
        FakeEngine::new("primary", false),
        FakeEngine::new("secondary", false),
    );
    let artifact = ex
        .export_to_file(sample(), ExportFormat::Markdown, &path)
        .await
        .unwrap();
    let written = std::fs::read(&path).unwrap();
    assert_eq!(written, artifact.as_bytes());
    assert!(!dir.path().join("out/report.md.tmp").exists());
}

#[tokio::test]
async fn test_export_to_file_failure_leaves_no_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    // A directory in the way makes the final rename fail.
    let path = dir.path().join("report.md");
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("keep"), b"x").unwrap();
    let ex = exporter(
        CapabilityRecord::from_flags(false, false, false),
        Arc::new(FakePandoc::default()),
        FakeEngine::new("primary", false),
        FakeEngine::new("secondary", false),
    );
    let err = ex
        .export_to_file(sample(), ExportFormat::Markdown, &path)
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Io { .. }), "got {err:?}");
    assert!(!dir.path().join("report.md.tmp").exists());
    assert!(path.join("keep").exists());
}

#[tokio::test]
async fn test_export_async_reports_errors() {
    let ex = exporter(
        CapabilityRecord::from_flags(false, false, false),
        Arc::new(FakePandoc::default()),
        FakeEngine::new("primary", false),
        FakeEngine::new("secondary", false),
    );
    let err = ex.export_async(sample(), ExportFormat::Docx).await.unwrap_err();
    assert!(err.is_unavailable());
}

// ── Real tools ───────────────────────────────────────────────────────────────

#[test]
fn test_real_pandoc_docx() {
    skip_unless_installed!("pandoc");
    let config = ExportConfig::default();
    let ex = ReportExporter::with_backends(
        config.clone(),
        CapabilityRecord::probe(&config),
        Backends::from_config(&config),
    );
    let bytes = ex.render_docx(&sample()).unwrap();
    let xml = docx_part(&bytes, DOCUMENT_XML);
    assert!(xml.contains("Stable earnings."));
    assert!(!xml.contains("<w:bidi"));
}

#[test]
fn test_real_wkhtmltopdf() {
    skip_unless_installed!("wkhtmltopdf");
    let config = ExportConfig::default();
    let ex = ReportExporter::with_backends(
        config.clone(),
        CapabilityRecord::probe(&config),
        Backends::from_config(&config),
    );
    let artifact = ex.export(&sample(), ExportFormat::Pdf).unwrap();
    assert!(artifact.as_bytes().starts_with(b"%PDF"));
}

#[test]
fn test_software_renderer_with_system_font() {
    let Some(font) = cjk_fonts::locate_cjk_font() else {
        println!("SKIP: no CJK font on this host");
        return;
    };
    let ex = exporter(
        CapabilityRecord::from_flags(false, false, true).with_cjk_font(&font),
        Arc::new(FakePandoc::default()),
        FakeEngine::new("primary", false),
        Arc::new(SoftwarePdfEngine::new()),
    );
    let artifact = ex.export(&sample(), ExportFormat::Pdf).unwrap();
    assert!(artifact.as_bytes().starts_with(b"%PDF"));
    if !artifact.warnings.is_empty() {
        println!("SKIP: {} not loadable: {:?}", font.display(), artifact.warnings);
        return;
    }
    let pdf = String::from_utf8_lossy(artifact.as_bytes()).into_owned();
    assert!(pdf.contains("/Identity-H"), "font {} not embedded", font.display());
}
