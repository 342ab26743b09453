//! Pure-software HTML → PDF engine.
//!
//! Handles the self-contained documents produced by
//! [`crate::pipeline::html::render_standalone_html`]: block-level HTML and
//! one `@font-face`. Paper size and margins always come from the
//! [`PageSetup`] argument. No external process is involved, which makes this
//! the engine of last resort.
//!
//! ```text
//! html ──blocks::parse_html──► [Block] ──layout::layout──► [Page] ──writer::write_pdf──► %PDF bytes
//!                 │
//!                 └─ stylesheet ─► font file (fonts::font_face_source), unless the caller passes one
//! ```

pub mod blocks;
pub mod fonts;
pub mod layout;
pub mod writer;

use crate::backend::PdfEngine;
use crate::config::PageSetup;
use crate::error::BackendError;
use cjk_fonts::FontData;
use fonts::{EmbeddedFace, PageFont};
use layout::Geometry;
use tracing::{debug, warn};

const MM_TO_PT: f32 = 72.0 / 25.4;

/// The in-process PDF renderer.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwarePdfEngine;

impl SoftwarePdfEngine {
    pub fn new() -> Self {
        Self
    }

    /// Render a minimal document and check the result looks like a PDF.
    pub fn self_test(&self) -> Result<(), BackendError> {
        let html = "<html><body><h1>check</h1><p>ok</p></body></html>";
        let bytes = self.render_with_font(html, &PageSetup::default(), None)?;
        if bytes.starts_with(b"%PDF") {
            Ok(())
        } else {
            Err(BackendError::EmptyOutput(Some("missing %PDF header".into())))
        }
    }
}

impl PdfEngine for SoftwarePdfEngine {
    fn name(&self) -> &'static str {
        "software"
    }

    fn render(&self, html: &str, page: &PageSetup) -> Result<Vec<u8>, BackendError> {
        let doc = blocks::parse_html(html).map_err(BackendError::Render)?;
        let font_data = fonts::font_face_source(&doc.stylesheet).and_then(|path| {
            cjk_fonts::load_font(&path)
                .map_err(|e| warn!("Software renderer: {e}; using built-in Helvetica"))
                .ok()
        });
        render_blocks(&doc.blocks, page, font_data.as_ref())
    }

    fn render_with_font(
        &self,
        html: &str,
        page: &PageSetup,
        font: Option<&FontData>,
    ) -> Result<Vec<u8>, BackendError> {
        let doc = blocks::parse_html(html).map_err(BackendError::Render)?;
        render_blocks(&doc.blocks, page, font)
    }
}

fn render_blocks(
    blocks: &[blocks::Block],
    page: &PageSetup,
    font_data: Option<&FontData>,
) -> Result<Vec<u8>, BackendError> {
    let (width, height) = page.size.dimensions_pt();
    let geometry = Geometry {
        width,
        height,
        margin: page.margin_mm * MM_TO_PT,
    };

    let font = match font_data {
        Some(data) => match EmbeddedFace::parse(data) {
            Ok(face) => PageFont::Embedded(face),
            Err(e) => {
                warn!("Software renderer: cannot parse font {e}; using built-in Helvetica");
                PageFont::Builtin
            }
        },
        None => PageFont::Builtin,
    };

    let pages = layout::layout(blocks, &font, geometry);
    debug!(
        "Software renderer: {} blocks on {} pages",
        blocks.len(),
        pages.len()
    );
    let bytes = writer::write_pdf(&pages, &font, geometry)?;
    Ok(bytes)
}
