//! wkhtmltopdf as the primary HTML → PDF engine.
//!
//! The HTML is written next to the output inside a scoped temporary
//! directory; `--enable-local-file-access` lets the page reference local
//! fonts and images.

use super::{probe_version, run_command, DEFAULT_TIMEOUT, PdfEngine};
use crate::config::PageSetup;
use crate::error::BackendError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct WkhtmltopdfEngine {
    program: PathBuf,
    timeout: Duration,
}

impl WkhtmltopdfEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Kill a conversion still running after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `wkhtmltopdf --version`, first line.
    pub fn version(&self) -> Result<String, BackendError> {
        probe_version(&self.program)
    }
}

pub fn wkhtmltopdf_args(page: &PageSetup, input: &Path, output: &Path) -> Vec<OsString> {
    let margin = page.margin_arg();
    let mut args: Vec<OsString> = vec![
        "--quiet".into(),
        "--encoding".into(),
        "UTF-8".into(),
        "--enable-local-file-access".into(),
        "--page-size".into(),
        page.size.name().into(),
    ];
    for side in ["--margin-top", "--margin-right", "--margin-bottom", "--margin-left"] {
        args.push(side.into());
        args.push(margin.clone().into());
    }
    args.push(input.as_os_str().to_owned());
    args.push(output.as_os_str().to_owned());
    args
}

impl PdfEngine for WkhtmltopdfEngine {
    fn name(&self) -> &'static str {
        "wkhtmltopdf"
    }

    fn render(&self, html: &str, page: &PageSetup) -> Result<Vec<u8>, BackendError> {
        let dir = TempDir::new()?;
        let input = dir.path().join("in.html");
        let output = dir.path().join("out.pdf");
        std::fs::write(&input, html)?;

        run_command(
            &self.program,
            wkhtmltopdf_args(page, &input, &output),
            None,
            self.timeout,
        )?;

        let bytes = match std::fs::read(&output) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::EmptyOutput(Some("no output file".into())))
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Err(BackendError::EmptyOutput(None));
        }
        if !bytes.starts_with(b"%PDF") {
            return Err(BackendError::EmptyOutput(Some("output is not a PDF".into())));
        }
        Ok(bytes)
    }
}
