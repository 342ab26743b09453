//! Export results.

use crate::error::{ExportError, PostProcessingWarning};
use std::fmt;
use std::str::FromStr;

/// Requested artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Markdown,
    Docx,
    Pdf,
}

impl ExportFormat {
    /// Conventional file extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Docx => "docx",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Pdf => "application/pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Markdown => "markdown",
            ExportFormat::Docx => "docx",
            ExportFormat::Pdf => "pdf",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "docx" | "word" => Ok(ExportFormat::Docx),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(ExportError::InvalidConfig(format!(
                "unknown export format '{other}' (expected markdown, docx or pdf)"
            ))),
        }
    }
}

/// Artifact payload: UTF-8 text for Markdown, opaque bytes otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactContent {
    Text(String),
    Binary(Vec<u8>),
}

/// A produced document plus how it was produced.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    pub content: ArtifactContent,
    /// Name of the backend that produced the bytes (`"markdown"` for text).
    pub backend: &'static str,
    /// Non-fatal degradations raised during this export.
    pub warnings: Vec<PostProcessingWarning>,
}

impl ExportArtifact {
    pub fn as_bytes(&self) -> &[u8] {
        match &self.content {
            ArtifactContent::Text(s) => s.as_bytes(),
            ArtifactContent::Binary(b) => b,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self.content {
            ArtifactContent::Text(s) => s.into_bytes(),
            ArtifactContent::Binary(b) => b,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            ArtifactContent::Text(s) => Some(s),
            ArtifactContent::Binary(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert_eq!(" PDF ".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert_eq!("word".parse::<ExportFormat>().unwrap(), ExportFormat::Docx);
        let err = "odt".parse::<ExportFormat>().unwrap_err();
        assert!(err.to_string().contains("odt"));
    }

    #[test]
    fn display_round_trips() {
        for f in [ExportFormat::Markdown, ExportFormat::Docx, ExportFormat::Pdf] {
            assert_eq!(f.to_string().parse::<ExportFormat>().unwrap(), f);
        }
    }

    #[test]
    fn artifact_views() {
        let a = ExportArtifact {
            format: ExportFormat::Markdown,
            content: ArtifactContent::Text("# x".into()),
            backend: "markdown",
            warnings: vec![],
        };
        assert_eq!(a.as_text(), Some("# x"));
        assert_eq!(a.len(), 3);
        assert_eq!(a.into_bytes(), b"# x");
    }
}
