//! Fonts for the software renderer.
//!
//! Two font sources exist:
//!
//! - [`PageFont::Builtin`]: the standard Helvetica pair, WinAnsi encoded.
//!   Needs no embedding; characters outside WinAnsi are drawn as `?`.
//! - [`PageFont::Embedded`]: a TrueType/OpenType face embedded as a
//!   CID-keyed Type0 font (`Identity-H`, glyph ids as CIDs). Bold is
//!   synthesized by the writer since only one face is embedded.

use cjk_fonts::{FontData, Outlines};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use ttf_parser::{Face, GlyphId};

/// Resource name of the regular face in every page's font dictionary.
pub const REGULAR: &str = "F1";
/// Resource name of the bold face (builtin font only).
pub const BOLD: &str = "F2";

pub enum PageFont<'a> {
    Builtin,
    Embedded(EmbeddedFace<'a>),
}

impl PageFont<'_> {
    /// Advance width of `c` at `size` points.
    pub fn char_width(&self, c: char, size: f32, bold: bool) -> f32 {
        match self {
            PageFont::Builtin => builtin_width(c, bold) as f32 * size / 1000.0,
            PageFont::Embedded(face) => face.advance(c) * size,
        }
    }

    pub fn text_width(&self, text: &str, size: f32, bold: bool) -> f32 {
        text.chars().map(|c| self.char_width(c, size, bold)).sum()
    }

    /// `true` when `c` can be drawn with a real glyph.
    pub fn has_glyph(&self, c: char) -> bool {
        match self {
            PageFont::Builtin => win_ansi(c).is_some(),
            PageFont::Embedded(face) => face.glyph(c) != 0,
        }
    }
}

// ── Embedded face ────────────────────────────────────────────────────────

pub struct EmbeddedFace<'a> {
    pub face: Face<'a>,
    pub data: &'a FontData,
    units_per_em: f32,
}

impl<'a> EmbeddedFace<'a> {
    pub fn parse(data: &'a FontData) -> Result<Self, String> {
        let face = Face::parse(&data.bytes, 0)
            .map_err(|e| format!("{}: {e}", data.path.display()))?;
        let units_per_em = f32::from(face.units_per_em().max(1));
        Ok(Self {
            face,
            data,
            units_per_em,
        })
    }

    /// Glyph id for `c`, `0` (`.notdef`) when missing.
    pub fn glyph(&self, c: char) -> u16 {
        self.face.glyph_index(c).map(|g| g.0).unwrap_or(0)
    }

    /// Advance of `c` in em units.
    fn advance(&self, c: char) -> f32 {
        self.glyph_advance(self.glyph(c)) as f32 / self.units_per_em
    }

    /// Advance of glyph `gid` in PDF glyph space (1/1000 em).
    pub fn glyph_width(&self, gid: u16) -> u32 {
        (self.glyph_advance(gid) as f32 * 1000.0 / self.units_per_em).round() as u32
    }

    fn glyph_advance(&self, gid: u16) -> u16 {
        self.face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0)
    }

    /// Scale a font-unit metric to 1/1000 em.
    pub fn scaled(&self, units: i16) -> i32 {
        (f32::from(units) * 1000.0 / self.units_per_em).round() as i32
    }

    pub fn is_cff(&self) -> bool {
        self.data.outlines == Outlines::Cff
    }

    /// PostScript-safe font name derived from the file name.
    pub fn base_name(&self) -> String {
        let stem = self
            .data
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name: String = stem.chars().filter(char::is_ascii_alphanumeric).collect();
        if name.is_empty() {
            "EmbeddedCJK".to_string()
        } else {
            name
        }
    }
}

// ── Stylesheet lookup ────────────────────────────────────────────────────

static RE_FONT_FACE_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)@font-face\s*\{[^}]*?src\s*:\s*url\(\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)"|([^'")\s]+))\s*\)"#,
    )
    .unwrap()
});

/// Path of the first `@font-face` source declared in `stylesheet`.
pub fn font_face_source(stylesheet: &str) -> Option<PathBuf> {
    let caps = RE_FONT_FACE_SRC.captures(stylesheet)?;
    let raw = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
    let url = unescape_css(raw.as_str().trim());
    let path = url.strip_prefix("file://").unwrap_or(&url);
    Some(PathBuf::from(path))
}

/// Undo CSS string escapes: `\'`, `\\` and hex escapes such as `\3c `.
fn unescape_css(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let mut hex = String::new();
        while hex.len() < 6 {
            match chars.peek() {
                Some(h) if h.is_ascii_hexdigit() => {
                    hex.push(*h);
                    chars.next();
                }
                _ => break,
            }
        }
        if hex.is_empty() {
            if let Some(next) = chars.next() {
                out.push(next);
            }
            continue;
        }
        if chars.peek() == Some(&' ') {
            chars.next();
        }
        let decoded = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32);
        out.push(decoded.unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    out
}

// ── Builtin Helvetica ────────────────────────────────────────────────────

/// WinAnsi code for `c`, if the encoding has one.
pub fn win_ansi(c: char) -> Option<u8> {
    match c {
        ' '..='~' => Some(c as u8),
        '\u{a0}' => Some(b' '),
        '\u{a1}'..='\u{ff}' => Some(c as u32 as u8),
        '€' => Some(0x80),
        '‚' => Some(0x82),
        '„' => Some(0x84),
        '…' => Some(0x85),
        '‘' => Some(0x91),
        '’' => Some(0x92),
        '“' => Some(0x93),
        '”' => Some(0x94),
        '•' => Some(0x95),
        '–' => Some(0x96),
        '—' => Some(0x97),
        '™' => Some(0x99),
        _ => None,
    }
}

/// Width in 1/1000 em of `c` in Helvetica (or Helvetica-Bold).
/// Unencodable characters measure as `?`.
pub fn builtin_width(c: char, bold: bool) -> u16 {
    let code = win_ansi(c).unwrap_or(b'?');
    match code {
        32..=126 => {
            let table = if bold { &HELVETICA_BOLD } else { &HELVETICA };
            table[usize::from(code - 32)]
        }
        0x85 | 0x97 => 1000,
        0x91 | 0x92 => 222,
        0x93 | 0x94 => 333,
        0x95 => 350,
        0x99 => 1000,
        _ => 556,
    }
}

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helvetica_widths() {
        assert_eq!(builtin_width(' ', false), 278);
        assert_eq!(builtin_width('W', false), 944);
        assert_eq!(builtin_width('i', false), 222);
        assert_eq!(builtin_width('i', true), 278);
        assert_eq!(builtin_width('~', true), 584);
        // Unencodable characters are drawn as '?'.
        assert_eq!(builtin_width('中', false), builtin_width('?', false));
    }

    #[test]
    fn win_ansi_mapping() {
        assert_eq!(win_ansi('A'), Some(b'A'));
        assert_eq!(win_ansi('é'), Some(0xe9));
        assert_eq!(win_ansi('•'), Some(0x95));
        assert_eq!(win_ansi('中'), None);
    }

    #[test]
    fn text_width_scales_with_size() {
        let font = PageFont::Builtin;
        let w10 = font.text_width("Hello", 10.0, false);
        let w20 = font.text_width("Hello", 20.0, false);
        assert!((w20 - 2.0 * w10).abs() < 1e-3);
        assert!((w10 - (722.0 + 556.0 + 222.0 + 222.0 + 556.0) / 100.0).abs() < 1e-3);
    }

    #[test]
    fn finds_font_face_src() {
        let css = "@page { size: A4; }\n@font-face {\n    font-family: 'ChineseFont';\n    src: url('C:/Windows/Fonts/simsun.ttc');\n}";
        assert_eq!(
            font_face_source(css),
            Some(PathBuf::from("C:/Windows/Fonts/simsun.ttc"))
        );
        assert_eq!(
            font_face_source("@font-face { src: url(\"file:///usr/share/fonts/a.ttf\") }"),
            Some(PathBuf::from("/usr/share/fonts/a.ttf"))
        );
        assert_eq!(font_face_source("body { font-family: sans-serif; }"), None);
    }

    #[test]
    fn font_face_src_keeps_escaped_quotes() {
        let html = crate::pipeline::html::render_standalone_html(
            "x",
            Some(std::path::Path::new("/fonts/O'Brien \"Sans\" <1>.ttf")),
            &crate::config::PageSetup::default(),
        );
        assert_eq!(
            font_face_source(&html),
            Some(PathBuf::from("/fonts/O'Brien \"Sans\" <1>.ttf"))
        );
        assert_eq!(
            font_face_source("@font-face { src: url(/fonts/plain.ttf) }"),
            Some(PathBuf::from("/fonts/plain.ttf"))
        );
    }
}
