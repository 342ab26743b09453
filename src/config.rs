//! Configuration types for report export.
//!
//! All export behaviour is controlled through [`ExportConfig`], built via its
//! [`ExportConfigBuilder`]. Tool paths, page geometry, labels and the DOCX
//! language tag live in one struct so a single config can be shared by every
//! pipeline and logged alongside the capability record.

use crate::error::ExportError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for report export.
///
/// Built via [`ExportConfig::builder()`] or using [`ExportConfig::default()`].
///
/// # Example
/// ```rust
/// use report_export::{ExportConfig, ReportLabels};
///
/// let config = ExportConfig::builder()
///     .lang("en-US")
///     .labels(ReportLabels::english())
///     .build()
///     .unwrap();
/// assert_eq!(config.docx.lang, "en-US");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Document converter executable. Default: `pandoc` (resolved on `PATH`).
    pub pandoc_path: PathBuf,

    /// Primary HTML→PDF engine executable. Default: `wkhtmltopdf`.
    pub wkhtmltopdf_path: PathBuf,

    /// Explicit CJK font file for the software PDF renderer.
    ///
    /// When `None` the platform font table (and `CJK_FONT_PATH`) is searched.
    pub font_path: Option<PathBuf>,

    /// Page geometry shared by both PDF engines.
    pub page: PageSetup,

    /// Options forwarded to the document converter.
    pub docx: DocxOptions,

    /// Title used in the HTML `<title>` and running page header.
    /// Default: `分析报告`.
    pub document_title: String,

    /// Headings and metadata labels used by the Markdown assembler.
    pub labels: ReportLabels,

    /// Per-run deadline for external converters in seconds. A converter
    /// still running at the deadline is killed. Default: 120.
    pub backend_timeout_secs: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            pandoc_path: PathBuf::from("pandoc"),
            wkhtmltopdf_path: PathBuf::from("wkhtmltopdf"),
            font_path: None,
            page: PageSetup::default(),
            docx: DocxOptions::default(),
            document_title: "分析报告".to_string(),
            labels: ReportLabels::default(),
            backend_timeout_secs: 120,
        }
    }
}

impl ExportConfig {
    /// Create a new builder for `ExportConfig`.
    pub fn builder() -> ExportConfigBuilder {
        ExportConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExportConfig`].
#[derive(Debug)]
pub struct ExportConfigBuilder {
    config: ExportConfig,
}

impl ExportConfigBuilder {
    pub fn pandoc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pandoc_path = path.into();
        self
    }

    pub fn wkhtmltopdf_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.wkhtmltopdf_path = path.into();
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = Some(path.into());
        self
    }

    pub fn page(mut self, page: PageSetup) -> Self {
        self.config.page = page;
        self
    }

    pub fn margin_mm(mut self, mm: f32) -> Self {
        self.config.page.margin_mm = mm;
        self
    }

    pub fn lang(mut self, tag: impl Into<String>) -> Self {
        self.config.docx.lang = tag.into();
        self
    }

    pub fn columns(mut self, n: u32) -> Self {
        self.config.docx.columns = n;
        self
    }

    pub fn document_title(mut self, title: impl Into<String>) -> Self {
        self.config.document_title = title.into();
        self
    }

    pub fn labels(mut self, labels: ReportLabels) -> Self {
        self.config.labels = labels;
        self
    }

    pub fn backend_timeout_secs(mut self, secs: u64) -> Self {
        self.config.backend_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExportConfig, ExportError> {
        let c = &self.config;
        if c.pandoc_path.as_os_str().is_empty() {
            return Err(ExportError::InvalidConfig(
                "pandoc path must not be empty".into(),
            ));
        }
        if c.wkhtmltopdf_path.as_os_str().is_empty() {
            return Err(ExportError::InvalidConfig(
                "wkhtmltopdf path must not be empty".into(),
            ));
        }
        if !(0.0..=60.0).contains(&c.page.margin_mm) {
            return Err(ExportError::InvalidConfig(format!(
                "page margin must be 0–60 mm, got {}",
                c.page.margin_mm
            )));
        }
        if c.docx.lang.trim().is_empty() || c.docx.lang.contains(char::is_whitespace) {
            return Err(ExportError::InvalidConfig(format!(
                "language tag must be a single non-empty token, got {:?}",
                c.docx.lang
            )));
        }
        if c.backend_timeout_secs == 0 {
            return Err(ExportError::InvalidConfig(
                "backend timeout must be at least 1 second".into(),
            ));
        }
        if c.docx.columns == 0 {
            return Err(ExportError::InvalidConfig("columns must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Page geometry ────────────────────────────────────────────────────────

/// Paper size and margins handed to [`crate::backend::PdfEngine::render`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSetup {
    /// Paper size name understood by the engines. Default: `A4`.
    pub size: PaperSize,
    /// Uniform margin on all four sides, in millimetres. Default: 20.
    pub margin_mm: f32,
}

impl Default for PageSetup {
    fn default() -> Self {
        Self {
            size: PaperSize::A4,
            margin_mm: 20.0,
        }
    }
}

impl PageSetup {
    /// Margin formatted for command-line engines, e.g. `20mm`.
    pub fn margin_arg(&self) -> String {
        format!("{}mm", self.margin_mm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperSize {
    #[default]
    A4,
    Letter,
}

impl PaperSize {
    /// Name as accepted by `--page-size` and CSS `@page size`.
    pub fn name(self) -> &'static str {
        match self {
            PaperSize::A4 => "A4",
            PaperSize::Letter => "Letter",
        }
    }

    /// Width and height in PostScript points.
    pub fn dimensions_pt(self) -> (f32, f32) {
        match self {
            PaperSize::A4 => (595.28, 841.89),
            PaperSize::Letter => (612.0, 792.0),
        }
    }
}

// ── Converter options ────────────────────────────────────────────────────

/// Options passed to [`crate::backend::DocumentConverter::convert`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocxOptions {
    /// Language metadata tag. Default: `zh-CN`.
    pub lang: String,
    /// Line width hint for the converter's writer. Default: 120.
    pub columns: u32,
}

impl Default for DocxOptions {
    fn default() -> Self {
        Self {
            lang: "zh-CN".to_string(),
            columns: 120,
        }
    }
}

// ── Labels ───────────────────────────────────────────────────────────────

/// Human-readable labels interpolated by the Markdown assembler.
///
/// Section titles are indexed like [`crate::document::SECTION_ORDER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLabels {
    pub title_suffix: String,
    pub date_label: String,
    pub analysts_label: String,
    pub depth_label: String,
    pub summary_title: String,
    pub section_titles: [String; 7],
    pub footer: String,
}

impl Default for ReportLabels {
    fn default() -> Self {
        Self::chinese()
    }
}

impl ReportLabels {
    /// Simplified Chinese labels.
    pub fn chinese() -> Self {
        Self {
            title_suffix: "股票分析报告".into(),
            date_label: "分析日期".into(),
            analysts_label: "分析师".into(),
            depth_label: "研究深度".into(),
            summary_title: "执行摘要".into(),
            section_titles: [
                "公司概况".into(),
                "财务分析".into(),
                "技术分析".into(),
                "市场分析".into(),
                "风险分析".into(),
                "估值分析".into(),
                "投资建议".into(),
            ],
            footer: "本报告由 TradingAgents-CN 自动生成".into(),
        }
    }

    /// English labels.
    pub fn english() -> Self {
        Self {
            title_suffix: "Stock Analysis Report".into(),
            date_label: "Analysis Date".into(),
            analysts_label: "Analysts".into(),
            depth_label: "Research Depth".into(),
            summary_title: "Executive Summary".into(),
            section_titles: [
                "Company Overview".into(),
                "Financial Analysis".into(),
                "Technical Analysis".into(),
                "Market Analysis".into(),
                "Risk Analysis".into(),
                "Valuation Analysis".into(),
                "Investment Recommendation".into(),
            ],
            footer: "This report was generated automatically by TradingAgents-CN".into(),
        }
    }
}
