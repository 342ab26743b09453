//! Conversion backends.
//!
//! Every external or in-process converter sits behind one of two single-method
//! traits so pipelines can be driven by fakes in tests:
//!
//! - [`DocumentConverter`]: Markdown → DOCX file (pandoc).
//! - [`PdfEngine`]: HTML → PDF bytes (wkhtmltopdf, or the software renderer).
//!
//! Implementations are stateless and shared behind `Arc`.

pub mod pandoc;
pub mod software;
pub mod wkhtmltopdf;

use crate::config::{DocxOptions, ExportConfig, PageSetup};
use crate::error::BackendError;
use cjk_fonts::FontData;
use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub use pandoc::PandocConverter;
pub use software::SoftwarePdfEngine;
pub use wkhtmltopdf::WkhtmltopdfEngine;

/// Markdown → word-processor document.
pub trait DocumentConverter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Convert `markdown` and write the document to `output`.
    fn convert(
        &self,
        markdown: &str,
        options: &DocxOptions,
        output: &Path,
    ) -> Result<(), BackendError>;
}

/// HTML → PDF.
pub trait PdfEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render `html` on pages described by `page`. The page setup wins over
    /// any `@page` rule in the document.
    fn render(&self, html: &str, page: &PageSetup) -> Result<Vec<u8>, BackendError>;

    /// Render with a font the caller has already loaded.
    ///
    /// Engines that resolve fonts by family name ignore `font`.
    fn render_with_font(
        &self,
        html: &str,
        page: &PageSetup,
        font: Option<&FontData>,
    ) -> Result<Vec<u8>, BackendError> {
        let _ = font;
        self.render(html, page)
    }
}

/// The backend set used by one exporter.
#[derive(Clone)]
pub struct Backends {
    pub converter: Arc<dyn DocumentConverter>,
    pub primary_pdf: Arc<dyn PdfEngine>,
    pub secondary_pdf: Arc<dyn PdfEngine>,
}

impl Backends {
    /// Real backends with tool paths taken from `config`.
    pub fn from_config(config: &ExportConfig) -> Self {
        let timeout = Duration::from_secs(config.backend_timeout_secs);
        Self {
            converter: Arc::new(PandocConverter::new(&config.pandoc_path).with_timeout(timeout)),
            primary_pdf: Arc::new(
                WkhtmltopdfEngine::new(&config.wkhtmltopdf_path).with_timeout(timeout),
            ),
            secondary_pdf: Arc::new(SoftwarePdfEngine::new()),
        }
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("converter", &self.converter.name())
            .field("primary_pdf", &self.primary_pdf.name())
            .field("secondary_pdf", &self.secondary_pdf.name())
            .finish()
    }
}

// ── Process helpers ──────────────────────────────────────────────────────

/// Default deadline for one external converter run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Deadline for `--version` checks.
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Run `program` to completion, optionally feeding `stdin`.
///
/// Returns captured stdout; a non-zero exit becomes
/// [`BackendError::ExitStatus`] carrying the trimmed stderr. A child still
/// running after `timeout` is killed and reaped before
/// [`BackendError::Timeout`] is returned, so the caller's temporary
/// directories can be removed.
pub(crate) fn run_command<I, S>(
    program: &Path,
    args: I,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<Vec<u8>, BackendError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program_name = program.display().to_string();
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    debug!("Running {:?} (timeout {:?})", cmd, timeout);

    let mut child = cmd.spawn().map_err(|source| BackendError::Spawn {
        program: program_name.clone(),
        source,
    })?;

    let stdin_pipe = child.stdin.take();
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let deadline = Instant::now() + timeout;

    // Drain pipes while polling; the child stalls once a pipe buffer fills.
    let (status, stdout, stderr) = thread::scope(|scope| {
        let writer = scope.spawn(move || -> io::Result<()> {
            if let (Some(mut pipe), Some(input)) = (stdin_pipe, stdin) {
                pipe.write_all(input)?;
                // Dropping the handle closes the pipe so the child sees EOF.
            }
            Ok(())
        });
        let out = scope.spawn(move || drain(stdout_pipe));
        let err = scope.spawn(move || drain(stderr_pipe));

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(Some(status)),
                Ok(None) if Instant::now() >= deadline => {
                    warn!("{program_name} still running after {timeout:?}; killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    break Ok(None);
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break Err(e);
                }
            }
        };

        // A child that exits before reading all input breaks the pipe; its
        // exit status reports the real failure.
        if let Ok(Err(e)) = writer.join() {
            debug!("{program_name}: writing stdin failed: {e}");
        }
        let stdout = out.join().unwrap_or_default();
        let stderr = err.join().unwrap_or_default();
        (status, stdout, stderr)
    });

    let Some(status) = status? else {
        return Err(BackendError::Timeout {
            program: program_name,
            after: timeout,
        });
    };
    if !status.success() {
        return Err(BackendError::ExitStatus {
            program: program_name,
            status: status.to_string(),
            stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
        });
    }
    Ok(stdout)
}

/// Read a child pipe to the end; a missing pipe or read error yields what was read.
fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

/// First line of `program --version`.
pub(crate) fn probe_version(program: &Path) -> Result<String, BackendError> {
    let stdout = run_command(program, ["--version"], None, VERSION_TIMEOUT)?;
    let text = String::from_utf8_lossy(&stdout);
    Ok(text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("unknown version")
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_spawn_error() {
        let err = probe_version(Path::new("/nonexistent/definitely-not-a-tool")).unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }), "got {err:?}");
        assert!(err.to_string().contains("definitely-not-a-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn stdin_is_forwarded() {
        let out = run_command(Path::new("cat"), Vec::<&str>::new(), Some(b"hello"), DEFAULT_TIMEOUT)
            .unwrap();
        assert_eq!(out, b"hello");
    }

    #[cfg(unix)]
    #[test]
    fn failure_carries_stderr() {
        let err = run_command(
            Path::new("sh"),
            ["-c", "echo boom >&2; exit 3"],
            None,
            DEFAULT_TIMEOUT,
        )
        .unwrap_err();
        match err {
            BackendError::ExitStatus { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn overrunning_child_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!("sleep 5 >/dev/null 2>&1; touch '{}'", marker.display());
        let started = Instant::now();
        let err = run_command(
            Path::new("sh"),
            ["-c", script.as_str()],
            None,
            Duration::from_millis(200),
        )
        .unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(4));
        thread::sleep(Duration::from_millis(300));
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn large_output_does_not_deadlock() {
        let out = run_command(
            Path::new("sh"),
            ["-c", "head -c 1000000 /dev/zero"],
            None,
            DEFAULT_TIMEOUT,
        )
        .unwrap();
        assert_eq!(out.len(), 1_000_000);
    }

    #[test]
    fn debug_lists_backend_names() {
        let backends = Backends::from_config(&ExportConfig::default());
        let dbg = format!("{backends:?}");
        assert!(dbg.contains("pandoc"));
        assert!(dbg.contains("wkhtmltopdf"));
        assert!(dbg.contains("software"));
    }
}
