//! pandoc as the Markdown → DOCX converter.

use super::{probe_version, run_command, DEFAULT_TIMEOUT, DocumentConverter};
use crate::config::DocxOptions;
use crate::error::BackendError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: PathBuf,
    timeout: Duration,
}

impl PandocConverter {
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

    /// `pandoc --version`, first line.
    pub fn version(&self) -> Result<String, BackendError> {
        probe_version(&self.program)
    }
}

/// Command-line arguments for one conversion.
///
/// YAML metadata blocks are disabled so a leading `---` rule in the report
/// body is never taken for front matter.
pub fn pandoc_args(options: &DocxOptions, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "--from=markdown-yaml_metadata_block",
        "--to=docx",
        "--standalone",
        "--wrap=preserve",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(format!("--columns={}", options.columns).into());
    args.push("-M".into());
    args.push(format!("lang={}", options.lang).into());
    args.push("-M".into());
    args.push("dir=ltr".into());
    args.push("-o".into());
    args.push(output.as_os_str().to_owned());
    args
}

impl DocumentConverter for PandocConverter {
    fn name(&self) -> &'static str {
        "pandoc"
    }

    fn convert(
        &self,
        markdown: &str,
        options: &DocxOptions,
        output: &Path,
    ) -> Result<(), BackendError> {
        run_command(
            &self.program,
            pandoc_args(options, output),
            Some(markdown.as_bytes()),
            self.timeout,
        )?;
        Ok(())
    }
}
