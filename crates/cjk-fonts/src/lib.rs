//! # cjk-fonts
//!
//! Locate a CJK-capable font file on the host and load it in a form a PDF
//! writer can embed.
//!
//! ## How it works
//!
//! On a call to [`locate_cjk_font`]:
//!
//! 1. If `CJK_FONT_PATH` points to an existing file, that file wins.
//! 2. Otherwise the platform table is consulted: a short, ordered list of
//!    well-known font filenames is checked against the platform's system and
//!    per-user font directories. The first existing file is returned.
//! 3. If nothing matches, `None` is returned. Callers decide how to degrade
//!    (usually a generic sans-serif family with missing-glyph boxes).
//!
//! There is no recursive directory scan: the lookup costs a handful of
//! `stat` calls and is deterministic.
//!
//! [`load_font`] reads the file and, for TrueType collections (`.ttc`),
//! extracts the first face into a standalone sfnt so it can be embedded
//! directly.
//!
//! ## Platform support
//!
//! | OS      | Directories                                        | Candidates (in order)                                  |
//! |---------|----------------------------------------------------|--------------------------------------------------------|
//! | Windows | `%WINDIR%\Fonts`                                   | `simsun.ttc`, `simhei.ttf`, `msyh.ttc`                 |
//! | macOS   | `/System/Library/Fonts`, `/Library/Fonts`, user    | `PingFang.ttc`, `STHeiti Light.ttc`, `Arial Unicode.ttf` |
//! | Linux   | noto / wqy / droid dirs under `/usr/share/fonts`, user | `NotoSansCJK-Regular.ttc`, `wqy-microhei.ttc`, …   |
//!
//! ## Environment variable overrides
//!
//! - `CJK_FONT_PATH`: path to a font file; skips the platform table.

use std::path::{Path, PathBuf};

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable naming an explicit font file.
pub const CJK_FONT_PATH_ENV: &str = "CJK_FONT_PATH";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned while loading a font file.
#[derive(Error, Debug)]
pub enum FontError {
    /// The file could not be read.
    #[error("Failed to read font '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a TrueType, OpenType or collection file.
    #[error("Unsupported font format in '{path}' (magic {magic:02x?})")]
    UnsupportedFormat { path: PathBuf, magic: [u8; 4] },

    /// A collection does not contain the requested face.
    #[error("Font collection has {count} faces, face {index} requested")]
    FaceOutOfRange { index: u32, count: u32 },

    /// Table directory or offsets point outside the file.
    #[error("Malformed font data: {0}")]
    Malformed(String),
}

// ── Platform table ───────────────────────────────────────────────────────────

/// Font directories and candidate filenames for one platform.
#[derive(Debug, Clone)]
pub struct PlatformFonts {
    /// Directories searched for each candidate, in order.
    pub dirs: Vec<PathBuf>,
    /// Font filenames, most preferred first.
    pub candidates: &'static [&'static str],
}

const WINDOWS_CANDIDATES: &[&str] = &["simsun.ttc", "simhei.ttf", "msyh.ttc"];

const MACOS_CANDIDATES: &[&str] = &[
    "PingFang.ttc",
    "STHeiti Light.ttc",
    "Hiragino Sans GB.ttc",
    "Arial Unicode.ttf",
];

const LINUX_CANDIDATES: &[&str] = &[
    "NotoSansCJK-Regular.ttc",
    "NotoSansSC-Regular.otf",
    "wqy-microhei.ttc",
    "wqy-zenhei.ttc",
    "DroidSansFallbackFull.ttf",
];

/// Returns the font directories and candidates for the current OS.
pub fn platform_fonts() -> PlatformFonts {
    platform_fonts_for(std::env::consts::OS)
}

fn platform_fonts_for(os: &str) -> PlatformFonts {
    let mut dirs = Vec::new();
    let candidates = match os {
        "windows" => {
            let windir = std::env::var("WINDIR").unwrap_or_else(|_| r"C:\Windows".to_string());
            dirs.push(PathBuf::from(windir).join("Fonts"));
            WINDOWS_CANDIDATES
        }
        "macos" => {
            dirs.push(PathBuf::from("/System/Library/Fonts"));
            dirs.push(PathBuf::from("/Library/Fonts"));
            MACOS_CANDIDATES
        }
        _ => {
            for d in [
                "/usr/share/fonts/opentype/noto",
                "/usr/share/fonts/noto-cjk",
                "/usr/share/fonts/google-noto-cjk",
                "/usr/share/fonts/truetype/wqy",
                "/usr/share/fonts/wenquanyi/wqy-microhei",
                "/usr/share/fonts/truetype/droid",
            ] {
                dirs.push(PathBuf::from(d));
            }
            LINUX_CANDIDATES
        }
    };

    if let Some(user_dir) = dirs::font_dir() {
        dirs.push(user_dir);
    }

    PlatformFonts { dirs, candidates }
}

// ── Lookup ───────────────────────────────────────────────────────────────────

/// Returns the first `candidate` that exists in any of `dirs`.
///
/// Candidate order takes precedence over directory order: a preferred font
/// in the last directory beats a fallback font in the first one.
pub fn locate_in<P: AsRef<Path>>(dirs: &[P], candidates: &[&str]) -> Option<PathBuf> {
    candidates.iter().find_map(|name| {
        dirs.iter()
            .map(|d| d.as_ref().join(name))
            .find(|p| p.is_file())
    })
}

/// Locate a CJK-capable font on this host.
///
/// `CJK_FONT_PATH` is honoured first when it names an existing file; an
/// override that does not exist is ignored and the platform table is used.
pub fn locate_cjk_font() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CJK_FONT_PATH_ENV) {
        let pb = PathBuf::from(p);
        if pb.is_file() {
            return Some(pb);
        }
    }
    let table = platform_fonts();
    locate_in(&table.dirs, table.candidates)
}

// ── Loading ──────────────────────────────────────────────────────────────────

/// Glyph outline flavour of an sfnt font.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outlines {
    /// `glyf` outlines (classic TrueType).
    TrueType,
    /// `CFF ` outlines (OpenType/CFF, e.g. Noto Sans CJK).
    Cff,
}

/// A standalone sfnt font ready for embedding.
#[derive(Debug, Clone)]
pub struct FontData {
    /// Where the font was loaded from.
    pub path: PathBuf,
    /// Standalone sfnt bytes (a single face, never a collection).
    pub bytes: Vec<u8>,
    /// Outline flavour, which decides the embedding subtype.
    pub outlines: Outlines,
}

/// Read a font file, extracting face 0 from collections.
pub fn load_font(path: &Path) -> Result<FontData, FontError> {
    let raw = std::fs::read(path).map_err(|e| FontError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    if raw.len() < 4 {
        return Err(FontError::Malformed(format!(
            "'{}' is only {} bytes",
            path.display(),
            raw.len()
        )));
    }

    let magic = [raw[0], raw[1], raw[2], raw[3]];
    let bytes = match &magic {
        b"ttcf" => extract_face(&raw, 0)?,
        b"\x00\x01\x00\x00" | b"true" | b"OTTO" => raw,
        _ => {
            return Err(FontError::UnsupportedFormat {
                path: path.to_path_buf(),
                magic,
            })
        }
    };

    let outlines = if has_table(&bytes, b"CFF ")? {
        Outlines::Cff
    } else {
        Outlines::TrueType
    };

    Ok(FontData {
        path: path.to_path_buf(),
        bytes,
        outlines,
    })
}

/// Copy face `index` of a TrueType collection into a standalone sfnt.
///
/// Table data is copied verbatim, 4-byte aligned, with offsets rewritten.
/// Checksums are carried over unchanged.
pub fn extract_face(ttc: &[u8], index: u32) -> Result<Vec<u8>, FontError> {
    if ttc.get(..4) != Some(b"ttcf".as_slice()) {
        return Err(FontError::Malformed("missing 'ttcf' header".into()));
    }
    let count = read_u32(ttc, 8)?;
    if index >= count {
        return Err(FontError::FaceOutOfRange { index, count });
    }
    let face_offset = read_u32(ttc, 12 + 4 * index as usize)? as usize;

    let sfnt_version = read_u32(ttc, face_offset)?;
    let num_tables = read_u16(ttc, face_offset + 4)? as usize;

    let mut records = Vec::with_capacity(num_tables);
    for i in 0..num_tables {
        let rec = face_offset + 12 + 16 * i;
        let tag = ttc
            .get(rec..rec + 4)
            .ok_or_else(|| FontError::Malformed(format!("table record {i} truncated")))?;
        let checksum = read_u32(ttc, rec + 4)?;
        let offset = read_u32(ttc, rec + 8)? as usize;
        let length = read_u32(ttc, rec + 12)? as usize;
        let data = ttc.get(offset..offset + length).ok_or_else(|| {
            FontError::Malformed(format!(
                "table '{}' at {offset}+{length} exceeds file",
                String::from_utf8_lossy(tag)
            ))
        })?;
        records.push((tag, checksum, data));
    }

    let header_len = 12 + 16 * num_tables;
    let mut out = Vec::with_capacity(header_len + records.iter().map(|r| r.2.len() + 3).sum::<usize>());

    // Offset table. searchRange/entrySelector/rangeShift are derived from
    // numTables, so they are copied as-is.
    out.extend_from_slice(&sfnt_version.to_be_bytes());
    out.extend_from_slice(&(num_tables as u16).to_be_bytes());
    out.extend_from_slice(
        ttc.get(face_offset + 6..face_offset + 12)
            .ok_or_else(|| FontError::Malformed("offset table truncated".into()))?,
    );

    let mut next = header_len;
    for (tag, checksum, data) in &records {
        out.extend_from_slice(tag);
        out.extend_from_slice(&checksum.to_be_bytes());
        out.extend_from_slice(&(next as u32).to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        next += padded(data.len());
    }
    for (_, _, data) in &records {
        out.extend_from_slice(data);
        out.resize(out.len() + padded(data.len()) - data.len(), 0);
    }

    Ok(out)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn has_table(sfnt: &[u8], wanted: &[u8; 4]) -> Result<bool, FontError> {
    let num_tables = read_u16(sfnt, 4)? as usize;
    for i in 0..num_tables {
        let rec = 12 + 16 * i;
        if sfnt.get(rec..rec + 4) == Some(wanted.as_slice()) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, FontError> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| FontError::Malformed(format!("u32 read at {at} past end ({})", data.len())))
}

fn read_u16(data: &[u8], at: usize) -> Result<u16, FontError> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| FontError::Malformed(format!("u16 read at {at} past end ({})", data.len())))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
