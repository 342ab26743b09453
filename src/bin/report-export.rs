//! CLI binary for report-export.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExportConfig` and writes the artifact.

use anyhow::{bail, Context, Result};
use clap::Parser;
use report_export::{
    CapabilityRecord, ExportConfig, ExportFormat, ReportDocument, ReportExporter, ReportLabels,
};
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

/// Exit code used when `--timeout` killed every converter, as with coreutils `timeout`.
const TIMEOUT_EXIT: u8 = 124;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Markdown to stdout
  report-export report.json

  # PDF to file (wkhtmltopdf, falling back to the built-in renderer)
  report-export report.json --format pdf -o report.pdf

  # DOCX from stdin with English labels
  cat report.json | report-export --format docx --english -o report.docx

  # What can this host do?
  report-export --capabilities

INPUT:
  A JSON object with optional fields stock_symbol, analysis_date, analysts,
  research_depth, summary and reports (section key → Markdown body).
  Known section keys are emitted first, in a fixed order; any other keys
  follow in input order.

ENVIRONMENT VARIABLES:
  REPORT_EXPORT_PANDOC       pandoc executable (default: pandoc on PATH)
  REPORT_EXPORT_WKHTMLTOPDF  wkhtmltopdf executable (default: wkhtmltopdf on PATH)
  REPORT_EXPORT_FONT         CJK font file for the built-in PDF renderer
  CJK_FONT_PATH              Same, honoured by font discovery
  RUST_LOG                   Log filter (overrides -v / -q)

NOTES:
  --timeout applies to each external converter run. A converter still
  running when it fires is killed and its temporary files are removed; PDF
  export then falls back to the built-in renderer. When no backend produced
  the artifact because of the timeout, the process exits with code 124.
"#;

/// Export analysis reports to Markdown, DOCX or PDF.
#[derive(Parser, Debug)]
#[command(
    name = "report-export",
    version,
    about = "Export analysis reports to Markdown, DOCX or PDF",
    long_about = "Export a multi-section analysis report (JSON) to Markdown, DOCX (via pandoc) \
or PDF (via wkhtmltopdf, with a built-in software renderer as fallback). Missing converters \
are detected up front and reported with installation hints.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Report JSON file; `-` or omitted reads stdin.
    input: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, env = "REPORT_EXPORT_FORMAT", value_enum, default_value = "markdown")]
    format: FormatArg,

    /// Write the artifact to this file instead of stdout (required for docx/pdf).
    #[arg(short, long, env = "REPORT_EXPORT_OUTPUT")]
    output: Option<PathBuf>,

    /// Print the capability probe as JSON and exit.
    #[arg(long)]
    capabilities: bool,

    /// pandoc executable.
    #[arg(long, env = "REPORT_EXPORT_PANDOC", default_value = "pandoc")]
    pandoc: PathBuf,

    /// wkhtmltopdf executable.
    #[arg(long, env = "REPORT_EXPORT_WKHTMLTOPDF", default_value = "wkhtmltopdf")]
    wkhtmltopdf: PathBuf,

    /// CJK font file for the built-in PDF renderer.
    #[arg(long, env = "REPORT_EXPORT_FONT")]
    font: Option<PathBuf>,

    /// Language tag for DOCX metadata and the HTML document.
    #[arg(long, env = "REPORT_EXPORT_LANG", default_value = "zh-CN")]
    lang: String,

    /// Use English headings and labels instead of Chinese.
    #[arg(long, env = "REPORT_EXPORT_ENGLISH")]
    english: bool,

    /// Document title for the PDF running header.
    #[arg(long, env = "REPORT_EXPORT_TITLE")]
    title: Option<String>,

    /// Kill an external converter after this many seconds.
    #[arg(long, env = "REPORT_EXPORT_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "REPORT_EXPORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "REPORT_EXPORT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Markdown,
    Docx,
    Pdf,
}

impl From<FormatArg> for ExportFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Markdown => ExportFormat::Markdown,
            FormatArg::Docx => ExportFormat::Docx,
            FormatArg::Pdf => ExportFormat::Pdf,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    // ── Capabilities-only mode ───────────────────────────────────────────
    if cli.capabilities {
        let caps = tokio::task::spawn_blocking(move || CapabilityRecord::probe(&config))
            .await
            .context("Capability probe panicked")?;
        println!("{}", caps.to_json());
        return Ok(ExitCode::SUCCESS);
    }

    let format: ExportFormat = cli.format.into();
    if cli.output.is_none() && format != ExportFormat::Markdown {
        bail!("--format {format} produces binary output; use -o/--output to choose a file");
    }

    let doc = read_document(cli.input.as_ref())
        .await
        .context("Failed to read report document")?;

    let exporter = tokio::task::spawn_blocking(move || ReportExporter::new(config))
        .await
        .context("Capability probe panicked")?;

    // ── Run export ───────────────────────────────────────────────────────
    let result = match &cli.output {
        Some(path) => exporter.export_to_file(doc, format, path).await,
        None => exporter.export_async(doc, format).await,
    };
    let artifact = match result {
        Ok(artifact) => artifact,
        Err(e) if e.is_timeout() => {
            eprintln!("Error: export timed out after {}s: {e}", cli.timeout);
            return Ok(ExitCode::from(TIMEOUT_EXIT));
        }
        Err(e) => return Err(e).context("Export failed"),
    };
    if cli.output.is_none() {
        let mut handle = io::stdout().lock();
        handle
            .write_all(artifact.as_bytes())
            .context("Failed to write to stdout")?;
    }

    if !cli.quiet {
        for w in &artifact.warnings {
            eprintln!("{} {w}", yellow("⚠"));
        }
        if let Some(path) = &cli.output {
            eprintln!(
                "{}  {} bytes via {}  →  {}",
                green("✔"),
                artifact.len(),
                artifact.backend,
                bold(&path.display().to_string()),
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Map CLI args to `ExportConfig`.
fn build_config(cli: &Cli) -> Result<ExportConfig> {
    let labels = if cli.english {
        ReportLabels::english()
    } else {
        ReportLabels::chinese()
    };
    let mut builder = ExportConfig::builder()
        .pandoc_path(&cli.pandoc)
        .wkhtmltopdf_path(&cli.wkhtmltopdf)
        .lang(&cli.lang)
        .labels(labels)
        .backend_timeout_secs(cli.timeout);
    if let Some(font) = &cli.font {
        builder = builder.font_path(font);
    }
    if let Some(title) = &cli.title {
        builder = builder.document_title(title);
    } else if cli.english {
        builder = builder.document_title("Analysis Report");
    }
    builder.build().context("Invalid configuration")
}

/// Parse the report JSON from a file or stdin.
async fn read_document(input: Option<&PathBuf>) -> Result<ReportDocument> {
    let text = match input.filter(|p| p.as_os_str() != "-") {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            if io::stdin().is_terminal() {
                bail!("no input file given and stdin is a terminal");
            }
            tokio::task::spawn_blocking(|| {
                let mut s = String::new();
                io::stdin().read_to_string(&mut s).map(|_| s)
            })
            .await
            .context("stdin reader panicked")?
            .context("Failed to read stdin")?
        }
    };
    serde_json::from_str(&text).context("Report is not valid JSON")
}
