//! PDF 1.7 serialization of laid-out pages.
//!
//! Object layout:
//!
//! ```text
//! 1  Catalog
//! 2  Pages
//! 3  Info
//! 4… fonts (2 Type1 dictionaries, or the 5 objects of an embedded Type0 font)
//! …  per page: Page dictionary + content stream
//! ```
//!
//! Content and font streams are Flate-compressed. Text for an embedded font
//! is written as 2-byte glyph ids (`Identity-H`); the glyphs actually used
//! determine the `/W` widths array and the ToUnicode map.

use super::fonts::{win_ansi, EmbeddedFace, PageFont, BOLD, REGULAR};
use super::layout::{DrawOp, Geometry, Page};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, Write};

/// Serialize `pages` into a complete PDF file.
pub fn write_pdf(pages: &[Page], font: &PageFont<'_>, geometry: Geometry) -> io::Result<Vec<u8>> {
    let mut used: BTreeMap<u16, char> = BTreeMap::new();
    let contents: Vec<Vec<u8>> = pages
        .iter()
        .map(|page| content_stream(page, font, &mut used))
        .collect();

    let mut pdf = PdfWriter::new();
    let catalog = pdf.reserve();
    let pages_id = pdf.reserve();
    let info = pdf.reserve();

    let font_refs = match font {
        PageFont::Builtin => {
            let regular = pdf.reserve();
            let bold = pdf.reserve();
            pdf.object(regular, &standard_font("Helvetica"))?;
            pdf.object(bold, &standard_font("Helvetica-Bold"))?;
            format!("/{REGULAR} {regular} 0 R /{BOLD} {bold} 0 R")
        }
        PageFont::Embedded(face) => {
            let type0 = write_embedded_font(&mut pdf, face, &used)?;
            format!("/{REGULAR} {type0} 0 R")
        }
    };

    let mut kids = Vec::with_capacity(pages.len());
    for content in &contents {
        let page_id = pdf.reserve();
        let content_id = pdf.reserve();
        pdf.stream(content_id, "", content)?;
        pdf.object(
            page_id,
            &format!(
                "<< /Type /Page /Parent {pages_id} 0 R /MediaBox [0 0 {} {}] /Resources << /Font << {font_refs} >> >> /Contents {content_id} 0 R >>",
                num(geometry.width),
                num(geometry.height),
            ),
        )?;
        kids.push(format!("{page_id} 0 R"));
    }

    pdf.object(
        pages_id,
        &format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            kids.len()
        ),
    )?;
    pdf.object(catalog, &format!("<< /Type /Catalog /Pages {pages_id} 0 R >>"))?;
    pdf.object(
        info,
        &format!("<< /Producer (report-export {}) >>", env!("CARGO_PKG_VERSION")),
    )?;
    Ok(pdf.finish(catalog, info))
}

// ── File structure ───────────────────────────────────────────────────────

struct PdfWriter {
    buf: Vec<u8>,
    /// Byte offset of each object; index is object number − 1.
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buf = Vec::with_capacity(64 * 1024);
        buf.extend_from_slice(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: Vec::new(),
        }
    }

    fn reserve(&mut self) -> u32 {
        self.offsets.push(0);
        self.offsets.len() as u32
    }

    fn object(&mut self, id: u32, body: &str) -> io::Result<()> {
        self.offsets[id as usize - 1] = self.buf.len();
        write!(self.buf, "{id} 0 obj\n{body}\nendobj\n")
    }

    /// Write a Flate-compressed stream; `extra` is spliced into its dictionary.
    fn stream(&mut self, id: u32, extra: &str, data: &[u8]) -> io::Result<()> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;

        self.offsets[id as usize - 1] = self.buf.len();
        write!(
            self.buf,
            "{id} 0 obj\n<< /Length {} /Filter /FlateDecode{extra} >>\nstream\n",
            compressed.len()
        )?;
        self.buf.extend_from_slice(&compressed);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
        Ok(())
    }

    fn finish(mut self, root: u32, info: u32) -> Vec<u8> {
        let xref_at = self.buf.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.offsets.len() + 1);
        for offset in &self.offsets {
            let _ = writeln!(xref, "{offset:010} 00000 n ");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root {root} 0 R /Info {info} 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            self.offsets.len() + 1
        );
        self.buf.extend_from_slice(xref.as_bytes());
        self.buf
    }
}

fn standard_font(base: &str) -> String {
    format!("<< /Type /Font /Subtype /Type1 /BaseFont /{base} /Encoding /WinAnsiEncoding >>")
}

// ── Content streams ──────────────────────────────────────────────────────

fn content_stream(page: &Page, font: &PageFont<'_>, used: &mut BTreeMap<u16, char>) -> Vec<u8> {
    let mut out = String::new();
    for op in &page.ops {
        match op {
            DrawOp::Text {
                x,
                y,
                size,
                bold,
                text,
            } => {
                let (resource, encoded, fake_bold) = match font {
                    PageFont::Builtin => {
                        let res = if *bold { BOLD } else { REGULAR };
                        (res, literal_string(text), false)
                    }
                    PageFont::Embedded(face) => (REGULAR, glyph_string(face, text, used), *bold),
                };
                if fake_bold {
                    let _ = write!(out, "q 2 Tr {} w ", num(size * 0.03));
                }
                let _ = writeln!(
                    out,
                    "BT 0 g /{resource} {} Tf 1 0 0 1 {} {} Tm {encoded} Tj ET",
                    num(*size),
                    num(*x),
                    num(*y)
                );
                if fake_bold {
                    out.push_str("Q\n");
                }
            }
            DrawOp::Fill { x, y, w, h, gray } => {
                let _ = writeln!(
                    out,
                    "q {} g {} {} {} {} re f Q",
                    num(*gray),
                    num(*x),
                    num(*y),
                    num(*w),
                    num(*h)
                );
            }
            DrawOp::Frame { x, y, w, h, gray } => {
                let _ = writeln!(
                    out,
                    "q {} G 0.5 w {} {} {} {} re S Q",
                    num(*gray),
                    num(*x),
                    num(*y),
                    num(*w),
                    num(*h)
                );
            }
            DrawOp::Line {
                x1,
                y1,
                x2,
                y2,
                width,
                gray,
            } => {
                let _ = writeln!(
                    out,
                    "q {} G {} w {} {} m {} {} l S Q",
                    num(*gray),
                    num(*width),
                    num(*x1),
                    num(*y1),
                    num(*x2),
                    num(*y2)
                );
            }
        }
    }
    out.into_bytes()
}

/// WinAnsi literal string; characters outside the encoding become `?`.
fn literal_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('(');
    for c in text.chars() {
        let b = win_ansi(c).unwrap_or(b'?');
        match b {
            b'(' | b')' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{b:03o}");
            }
        }
    }
    out.push(')');
    out
}

/// Hex string of 2-byte glyph ids, recording each glyph used.
fn glyph_string(face: &EmbeddedFace<'_>, text: &str, used: &mut BTreeMap<u16, char>) -> String {
    let mut out = String::with_capacity(text.len() * 4 + 2);
    out.push('<');
    for c in text.chars() {
        let gid = face.glyph(c);
        if gid != 0 {
            used.entry(gid).or_insert(c);
        }
        let _ = write!(out, "{gid:04X}");
    }
    out.push('>');
    out
}

// ── Embedded font ────────────────────────────────────────────────────────

/// Write the font program, descriptor, CID font, ToUnicode map and Type0
/// dictionary. Returns the Type0 object number.
fn write_embedded_font(
    pdf: &mut PdfWriter,
    face: &EmbeddedFace<'_>,
    used: &BTreeMap<u16, char>,
) -> io::Result<u32> {
    let file_id = pdf.reserve();
    let descriptor_id = pdf.reserve();
    let cid_id = pdf.reserve();
    let to_unicode_id = pdf.reserve();
    let type0_id = pdf.reserve();

    let name = face.base_name();
    let program = &face.data.bytes;
    let (file_key, file_extra, cid_subtype, cid_to_gid) = if face.is_cff() {
        ("FontFile3", " /Subtype /OpenType".to_string(), "CIDFontType0", "")
    } else {
        (
            "FontFile2",
            format!(" /Length1 {}", program.len()),
            "CIDFontType2",
            " /CIDToGIDMap /Identity",
        )
    };
    pdf.stream(file_id, &file_extra, program)?;

    let bbox = face.face.global_bounding_box();
    let ascent = face.scaled(face.face.ascender());
    let descent = face.scaled(face.face.descender());
    pdf.object(
        descriptor_id,
        &format!(
            "<< /Type /FontDescriptor /FontName /{name} /Flags 4 /FontBBox [{} {} {} {}] /ItalicAngle 0 /Ascent {ascent} /Descent {descent} /CapHeight {ascent} /StemV 80 /{file_key} {file_id} 0 R >>",
            face.scaled(bbox.x_min),
            face.scaled(bbox.y_min),
            face.scaled(bbox.x_max),
            face.scaled(bbox.y_max),
        ),
    )?;

    pdf.object(
        cid_id,
        &format!(
            "<< /Type /Font /Subtype /{cid_subtype} /BaseFont /{name} /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> /FontDescriptor {descriptor_id} 0 R /DW 1000 /W [{}]{cid_to_gid} >>",
            widths_array(face, used)
        ),
    )?;

    pdf.stream(to_unicode_id, "", to_unicode_cmap(used).as_bytes())?;

    pdf.object(
        type0_id,
        &format!(
            "<< /Type /Font /Subtype /Type0 /BaseFont /{name} /Encoding /Identity-H /DescendantFonts [{cid_id} 0 R] /ToUnicode {to_unicode_id} 0 R >>"
        ),
    )?;
    Ok(type0_id)
}

/// `/W` entries, grouping consecutive glyph ids: `first [w1 w2 …]`.
fn widths_array(face: &EmbeddedFace<'_>, used: &BTreeMap<u16, char>) -> String {
    let mut out = String::new();
    let mut run: Option<(u16, u16)> = None;
    let mut widths: Vec<String> = Vec::new();
    for &gid in used.keys() {
        match run {
            Some((_, last)) if gid == last + 1 => run = run.map(|(first, _)| (first, gid)),
            _ => {
                if let Some((first, _)) = run {
                    let _ = write!(out, "{first} [{}] ", widths.join(" "));
                    widths.clear();
                }
                run = Some((gid, gid));
            }
        }
        widths.push(face.glyph_width(gid).to_string());
    }
    if let Some((first, _)) = run {
        let _ = write!(out, "{first} [{}]", widths.join(" "));
    }
    out.trim_end().to_string()
}

fn to_unicode_cmap(used: &BTreeMap<u16, char>) -> String {
    let mut out = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    let entries: Vec<(&u16, &char)> = used.iter().collect();
    for chunk in entries.chunks(100) {
        let _ = writeln!(out, "{} beginbfchar", chunk.len());
        for (gid, c) in chunk {
            let mut units = [0u16; 2];
            let hex: String = c
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{u:04X}"))
                .collect();
            let _ = writeln!(out, "<{gid:04X}> <{hex}>");
        }
        out.push_str("endbfchar\n");
    }
    out.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    out
}

/// Compact decimal formatting for content streams.
fn num(v: f32) -> String {
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    const A4: Geometry = Geometry {
        width: 595.28,
        height: 841.89,
        margin: 56.69,
    };

    fn text_page(text: &str, bold: bool) -> Page {
        Page {
            ops: vec![DrawOp::Text {
                x: 56.69,
                y: 780.0,
                size: 10.0,
                bold,
                text: text.into(),
            }],
        }
    }

    #[test]
    fn number_formatting() {
        assert_eq!(num(10.0), "10");
        assert_eq!(num(595.28), "595.28");
        assert_eq!(num(0.5), "0.5");
        assert_eq!(num(-0.001), "0");
    }

    #[test]
    fn literal_escapes() {
        assert_eq!(literal_string(r"a(b)\c"), r"(a\(b\)\\c)");
        assert_eq!(literal_string("中"), "(?)");
        assert_eq!(literal_string("é•"), r"(\351\225)");
    }

    #[test]
    fn builtin_document_structure() {
        let pages = vec![text_page("Hello", false), text_page("World", true)];
        let pdf = write_pdf(&pages, &PageFont::Builtin, A4).unwrap();
        let text = String::from_utf8_lossy(&pdf);
        assert!(pdf.starts_with(b"%PDF-1.7"));
        assert!(text.contains("/Type /Catalog"));
        assert!(text.contains("/Count 2"));
        assert!(text.contains("/BaseFont /Helvetica-Bold"));
        assert!(text.contains("/MediaBox [0 0 595.28 841.89]"));
        assert!(text.trim_end().ends_with("%%EOF"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let pdf = write_pdf(&[text_page("x", false)], &PageFont::Builtin, A4).unwrap();
        let text = String::from_utf8_lossy(&pdf).into_owned();
        let xref_at: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|s| s.lines().next())
            .and_then(|s| s.trim().parse().ok())
            .unwrap();
        assert!(pdf[xref_at..].starts_with(b"xref\n"));
        let table = &text[xref_at..];
        for (i, line) in table.lines().skip(3).take_while(|l| l.ends_with("n ")).enumerate() {
            let offset: usize = line[..10].parse().unwrap();
            let header = format!("{} 0 obj", i + 1);
            assert!(pdf[offset..].starts_with(header.as_bytes()), "object {} misplaced", i + 1);
        }
    }

    #[test]
    fn content_stream_is_flate_compressed() {
        let page = text_page("Hello", false);
        let raw = content_stream(&page, &PageFont::Builtin, &mut BTreeMap::new());
        let pdf = write_pdf(&[page], &PageFont::Builtin, A4).unwrap();

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let compressed = encoder.finish().unwrap();
        let at = pdf
            .windows(compressed.len())
            .position(|w| w == compressed.as_slice())
            .expect("compressed content present");

        let mut decoded = String::new();
        ZlibDecoder::new(&pdf[at..at + compressed.len()])
            .read_to_string(&mut decoded)
            .unwrap();
        assert!(decoded.contains("/F1 10 Tf"));
        assert!(decoded.contains("(Hello) Tj"));
    }

    #[test]
    fn to_unicode_map_lists_glyphs() {
        let used: BTreeMap<u16, char> = [(0x0102, '中'), (0x0200, '😀')].into_iter().collect();
        let cmap = to_unicode_cmap(&used);
        assert!(cmap.contains("2 beginbfchar"));
        assert!(cmap.contains("<0102> <4E2D>"));
        assert!(cmap.contains("<0200> <D83DDE00>"));
    }
}
