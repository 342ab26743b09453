//! Text-direction correction for DOCX packages.
//!
//! Some converter builds stamp `w:bidi` / `w:textDirection` into paragraph
//! properties, which flips CJK and Latin text right-to-left in Word. This
//! stage rewrites `word/document.xml` without those overrides.
//!
//! The work is split so the tree walk stays pure:
//!
//! 1. [`parse_tree`]: XML text → owned [`Node`] tree (lossless).
//! 2. [`strip_direction_overrides`]: tree → tree without overrides + count.
//! 3. [`write_tree`]: tree → XML bytes.
//!
//! [`fix_docx_direction`] wraps the three around the zip package, copying
//! every other part byte-for-byte.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::io::{Cursor, Read, Write};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Main document part inside the package.
pub const DOCUMENT_XML: &str = "word/document.xml";

/// Local names removed from paragraph properties.
const OVERRIDES: [&[u8]; 2] = [b"bidi", b"textDirection"];

#[derive(Debug, Error)]
pub enum DirectionError {
    #[error("invalid DOCX package: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("malformed {DOCUMENT_XML}: {0}")]
    Xml(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One node of an owned XML tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element {
        start: BytesStart<'static>,
        children: Vec<Node>,
    },
    Empty(BytesStart<'static>),
    /// Text, declarations, comments and the like, kept verbatim.
    Other(Event<'static>),
}

impl Node {
    fn local_name(&self) -> Option<&[u8]> {
        match self {
            Node::Element { start, .. } | Node::Empty(start) => Some(start.local_name().into_inner()),
            Node::Other(_) => None,
        }
    }
}

/// Parse an XML document into a tree.
pub fn parse_tree(xml: &str) -> Result<Vec<Node>, DirectionError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<(BytesStart<'static>, Vec<Node>)> = Vec::new();
    let mut root: Vec<Node> = Vec::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            DirectionError::Xml(format!("at byte {}: {e}", reader.buffer_position()))
        })?;
        let node = match event {
            Event::Eof => break,
            Event::Start(e) => {
                stack.push((e.into_owned(), Vec::new()));
                continue;
            }
            Event::End(_) => {
                let (start, children) = stack
                    .pop()
                    .ok_or_else(|| DirectionError::Xml("unbalanced end tag".into()))?;
                Node::Element { start, children }
            }
            Event::Empty(e) => Node::Empty(e.into_owned()),
            other => Node::Other(other.into_owned()),
        };
        match stack.last_mut() {
            Some((_, children)) => children.push(node),
            None => root.push(node),
        }
    }

    if let Some((start, _)) = stack.last() {
        return Err(DirectionError::Xml(format!(
            "unclosed element <{}>",
            String::from_utf8_lossy(start.name().as_ref())
        )));
    }
    Ok(root)
}

/// Remove every `bidi` / `textDirection` child of every `pPr`, at any depth.
///
/// Returns the rewritten tree and the number of elements removed.
pub fn strip_direction_overrides(nodes: Vec<Node>) -> (Vec<Node>, usize) {
    strip(nodes, false)
}

fn strip(nodes: Vec<Node>, in_paragraph_props: bool) -> (Vec<Node>, usize) {
    let mut removed = 0;
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        if in_paragraph_props && node.local_name().is_some_and(|n| OVERRIDES.contains(&n)) {
            removed += 1;
            continue;
        }
        match node {
            Node::Element { start, children } => {
                let is_ppr = start.local_name().as_ref() == b"pPr";
                let (children, n) = strip(children, is_ppr);
                removed += n;
                out.push(Node::Element { start, children });
            }
            other => out.push(other),
        }
    }
    (out, removed)
}

/// Serialize a tree back to XML.
pub fn write_tree(nodes: &[Node]) -> Result<Vec<u8>, DirectionError> {
    let mut writer = Writer::new(Vec::new());
    write_nodes(&mut writer, nodes)?;
    Ok(writer.into_inner())
}

fn write_nodes(writer: &mut Writer<Vec<u8>>, nodes: &[Node]) -> Result<(), DirectionError> {
    for node in nodes {
        match node {
            Node::Element { start, children } => {
                writer.write_event(Event::Start(start.borrow())).map_err(xml_err)?;
                write_nodes(writer, children)?;
                writer.write_event(Event::End(start.to_end())).map_err(xml_err)?;
            }
            Node::Empty(start) => {
                writer.write_event(Event::Empty(start.borrow())).map_err(xml_err)?;
            }
            Node::Other(event) => {
                writer.write_event(event.borrow()).map_err(xml_err)?;
            }
        }
    }
    Ok(())
}

fn xml_err(e: impl std::fmt::Display) -> DirectionError {
    DirectionError::Xml(e.to_string())
}

/// Strip direction overrides from a DOCX package.
///
/// Returns the corrected package and the number of overrides removed. When
/// nothing was removed the input bytes are returned unchanged.
pub fn fix_docx_direction(docx: &[u8]) -> Result<(Vec<u8>, usize), DirectionError> {
    let mut archive = ZipArchive::new(Cursor::new(docx))?;

    let mut xml = String::new();
    archive.by_name(DOCUMENT_XML)?.read_to_string(&mut xml)?;

    let (tree, removed) = strip_direction_overrides(parse_tree(&xml)?);
    if removed == 0 {
        return Ok((docx.to_vec(), 0));
    }
    let rewritten = write_tree(&tree)?;

    let mut out = ZipWriter::new(Cursor::new(Vec::with_capacity(docx.len())));
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i)?;
        if file.name() == DOCUMENT_XML {
            drop(file);
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            out.start_file(DOCUMENT_XML, options)?;
            out.write_all(&rewritten)?;
        } else {
            out.raw_copy_file(file)?;
        }
    }
    Ok((out.finish()?.into_inner(), removed))
}
