//! HTML → block list for the software renderer.
//!
//! The renderer only needs block structure and bold spans, so the HTML is
//! read as a stream of XML events and folded into a flat list of [`Block`]s.
//! The reader is tolerant: void elements written without a closing slash
//! (`<br>`), mismatched end tags and unknown entities do not abort parsing.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;

/// A styled span of inline text. `\n` inside `text` is a forced line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub bold: bool,
}

/// A table cell's inline content.
pub type Cell = Vec<Run>;

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading { level: u8, runs: Vec<Run> },
    Paragraph { runs: Vec<Run>, quote_depth: usize },
    ListItem { depth: usize, marker: String, runs: Vec<Run> },
    Code { text: String },
    Rule,
    Table { header: Option<Vec<Cell>>, rows: Vec<Vec<Cell>> },
}

/// Parsed body blocks plus the concatenated `<style>` text.
#[derive(Debug, Default)]
pub struct HtmlDocument {
    pub blocks: Vec<Block>,
    pub stylesheet: String,
}

/// Parse `html` into blocks.
pub fn parse_html(html: &str) -> Result<HtmlDocument, String> {
    let mut reader = Reader::from_str(html);
    reader.config_mut().check_end_names = false;

    let mut b = Builder::default();
    let mut last_error_at = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = tag_name(&e);
                if is_void(&name) {
                    b.empty(&name, &e);
                } else {
                    b.start(&name, &e);
                }
            }
            Ok(Event::Empty(e)) => {
                let name = tag_name(&e);
                b.empty(&name, &e);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                b.end(&name);
            }
            Ok(Event::Text(t)) => {
                let text = match t.unescape() {
                    Ok(text) => text,
                    Err(_) => Cow::Owned(decode_lossy(&String::from_utf8_lossy(&t))),
                };
                b.text(&text);
            }
            Ok(Event::CData(c)) => {
                let text = String::from_utf8_lossy(&c).into_owned();
                b.text(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                // Ill-formed markup is skipped; a second error at the same
                // offset means the reader cannot make progress.
                let at = reader.buffer_position();
                if last_error_at == Some(at) {
                    return Err(format!("HTML parse error at byte {at}: {e}"));
                }
                last_error_at = Some(at);
            }
        }
    }

    b.flush();
    Ok(HtmlDocument {
        blocks: b.blocks,
        stylesheet: b.stylesheet,
    })
}

fn tag_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase()
}

fn is_void(name: &str) -> bool {
    matches!(name, "br" | "hr" | "img" | "meta" | "link" | "input" | "col" | "wbr")
}

/// Resolve the handful of HTML entities XML does not know.
fn decode_lossy(raw: &str) -> String {
    raw.replace("&nbsp;", "\u{a0}")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

// ── Builder ──────────────────────────────────────────────────────────────

#[derive(Debug)]
enum Pending {
    Heading(u8),
    Paragraph,
    ListItem { depth: usize, marker: String },
    Code,
}

#[derive(Debug)]
struct ListCtx {
    ordered: bool,
    next: u64,
}

#[derive(Debug, Default)]
struct TableCtx {
    header: Option<Vec<Cell>>,
    rows: Vec<Vec<Cell>>,
    row: Vec<Cell>,
    row_is_header: bool,
    in_head: bool,
    cell: Option<Cell>,
}

#[derive(Debug, Default)]
struct Builder {
    blocks: Vec<Block>,
    stylesheet: String,
    pending: Option<(Pending, Vec<Run>)>,
    code: String,
    lists: Vec<ListCtx>,
    table: Option<TableCtx>,
    quote_depth: usize,
    bold_depth: usize,
    skip_depth: usize,
    in_style: bool,
}

impl Builder {
    fn start(&mut self, name: &str, e: &BytesStart<'_>) {
        if name == "style" {
            self.in_style = true;
        }
        if self.skip_depth > 0 {
            self.skip_depth += 1;
            return;
        }
        match name {
            "head" | "script" | "title" | "style" => self.skip_depth = 1,
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                let level = name.as_bytes()[1] - b'0';
                self.pending = Some((Pending::Heading(level), Vec::new()));
            }
            "p" => {
                if self.in_cell() {
                    return;
                }
                let in_item = matches!(self.pending, Some((Pending::ListItem { .. }, _)));
                if !in_item {
                    self.flush();
                    self.pending = Some((Pending::Paragraph, Vec::new()));
                } else if let Some((_, runs)) = &mut self.pending {
                    if !runs.is_empty() {
                        push_run(runs, "\n", false);
                    }
                }
            }
            "ul" | "ol" => {
                self.flush();
                let next = attr(e, b"start")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(1);
                self.lists.push(ListCtx {
                    ordered: name == "ol",
                    next,
                });
            }
            "li" => {
                self.flush();
                let depth = self.lists.len().max(1);
                let marker = match self.lists.last_mut() {
                    Some(list) if list.ordered => {
                        let m = format!("{}.", list.next);
                        list.next += 1;
                        m
                    }
                    _ => "•".to_string(),
                };
                self.pending = Some((Pending::ListItem { depth, marker }, Vec::new()));
            }
            "pre" => {
                self.flush();
                self.code.clear();
                self.pending = Some((Pending::Code, Vec::new()));
            }
            "blockquote" => {
                self.flush();
                self.quote_depth += 1;
            }
            "table" => {
                self.flush();
                self.table = Some(TableCtx::default());
            }
            "thead" => {
                if let Some(t) = &mut self.table {
                    t.in_head = true;
                }
            }
            "tr" => {
                if let Some(t) = &mut self.table {
                    t.row.clear();
                    t.row_is_header = t.in_head;
                }
            }
            "th" | "td" => {
                if let Some(t) = &mut self.table {
                    t.cell = Some(Vec::new());
                    if name == "td" {
                        t.row_is_header = t.in_head;
                    } else if t.row.is_empty() && t.rows.is_empty() && t.header.is_none() {
                        t.row_is_header = true;
                    }
                }
                if name == "th" {
                    self.bold_depth += 1;
                }
            }
            "strong" | "b" => self.bold_depth += 1,
            _ => {}
        }
    }

    fn empty(&mut self, name: &str, _e: &BytesStart<'_>) {
        if self.skip_depth > 0 {
            return;
        }
        match name {
            "br" => {
                if self.in_cell() {
                    if let Some(cell) = self.table.as_mut().and_then(|t| t.cell.as_mut()) {
                        push_run(cell, "\n", false);
                    }
                    return;
                }
                match &mut self.pending {
                    Some((Pending::Code, _)) => self.code.push('\n'),
                    Some((_, runs)) => push_run(runs, "\n", false),
                    None => {}
                }
            }
            "hr" => {
                self.flush();
                self.blocks.push(Block::Rule);
            }
            _ => {}
        }
    }

    fn end(&mut self, name: &str) {
        if name == "style" {
            self.in_style = false;
        }
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return;
        }
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "pre" => self.flush(),
            "p" => {
                if !matches!(self.pending, Some((Pending::ListItem { .. }, _))) {
                    self.flush();
                }
            }
            "li" => self.flush(),
            "ul" | "ol" => {
                self.flush();
                self.lists.pop();
            }
            "blockquote" => {
                self.flush();
                self.quote_depth = self.quote_depth.saturating_sub(1);
            }
            "thead" => {
                if let Some(t) = &mut self.table {
                    t.in_head = false;
                }
            }
            "th" | "td" => {
                if name == "th" {
                    self.bold_depth = self.bold_depth.saturating_sub(1);
                }
                if let Some(t) = &mut self.table {
                    if let Some(cell) = t.cell.take() {
                        t.row.push(trim_runs(cell));
                    }
                }
            }
            "tr" => {
                if let Some(t) = &mut self.table {
                    let row = std::mem::take(&mut t.row);
                    if row.is_empty() {
                        return;
                    }
                    if t.row_is_header && t.header.is_none() && t.rows.is_empty() {
                        t.header = Some(row);
                    } else {
                        t.rows.push(row);
                    }
                }
            }
            "table" => {
                if let Some(t) = self.table.take() {
                    if t.header.is_some() || !t.rows.is_empty() {
                        self.blocks.push(Block::Table {
                            header: t.header,
                            rows: t.rows,
                        });
                    }
                }
            }
            "strong" | "b" => self.bold_depth = self.bold_depth.saturating_sub(1),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if self.skip_depth > 0 {
            if self.in_style {
                self.stylesheet.push_str(text);
            }
            return;
        }
        if let Some((Pending::Code, _)) = &self.pending {
            self.code.push_str(text);
            return;
        }

        let collapsed = collapse_whitespace(text);
        let bold = self.bold_depth > 0;

        if let Some(table) = &mut self.table {
            if let Some(cell) = &mut table.cell {
                push_run(cell, &collapsed, bold);
            }
            return;
        }

        match &mut self.pending {
            Some((_, runs)) => push_run(runs, &collapsed, bold),
            None => {
                if collapsed.trim().is_empty() {
                    return;
                }
                let mut runs = Vec::new();
                push_run(&mut runs, &collapsed, bold);
                self.pending = Some((Pending::Paragraph, runs));
            }
        }
    }

    fn in_cell(&self) -> bool {
        self.table.as_ref().is_some_and(|t| t.cell.is_some())
    }

    /// Emit the pending block, if any.
    fn flush(&mut self) {
        let Some((kind, runs)) = self.pending.take() else {
            return;
        };
        let block = match kind {
            Pending::Code => {
                let text = std::mem::take(&mut self.code);
                let text = text.strip_suffix('\n').unwrap_or(&text).to_string();
                Block::Code { text }
            }
            kind => {
                let runs = trim_runs(runs);
                if runs.is_empty() {
                    return;
                }
                match kind {
                    Pending::Heading(level) => Block::Heading { level, runs },
                    Pending::ListItem { depth, marker } => Block::ListItem {
                        depth,
                        marker,
                        runs,
                    },
                    _ => Block::Paragraph {
                        runs,
                        quote_depth: self.quote_depth,
                    },
                }
            }
        };
        self.blocks.push(block);
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() && c != '\u{a0}' {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn push_run(runs: &mut Vec<Run>, text: &str, bold: bool) {
    if text.is_empty() {
        return;
    }
    match runs.last_mut() {
        Some(last) if last.bold == bold => last.text.push_str(text),
        _ => runs.push(Run {
            text: text.to_string(),
            bold,
        }),
    }
}

/// Drop leading/trailing whitespace of the whole run list.
fn trim_runs(mut runs: Vec<Run>) -> Vec<Run> {
    if let Some(first) = runs.first_mut() {
        first.text = first.text.trim_start().to_string();
    }
    if let Some(last) = runs.last_mut() {
        last.text = last.text.trim_end().to_string();
    }
    runs.retain(|r| !r.text.is_empty());
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(runs: &[Run]) -> String {
        runs.iter().map(|r| r.text.as_str()).collect()
    }

    #[test]
    fn headings_and_paragraphs() {
        let doc = parse_html("<h2>标题</h2>\n<p>正文 <strong>加粗</strong> 结束</p>\n").unwrap();
        assert_eq!(doc.blocks.len(), 2);
        match &doc.blocks[0] {
            Block::Heading { level, runs } => {
                assert_eq!(*level, 2);
                assert_eq!(text_of(runs), "标题");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &doc.blocks[1] {
            Block::Paragraph { runs, quote_depth } => {
                assert_eq!(*quote_depth, 0);
                assert_eq!(runs.len(), 3);
                assert!(runs[1].bold);
                assert_eq!(runs[1].text, "加粗");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn head_and_style_are_skipped_but_style_captured() {
        let html = "<html><head><meta charset=\"utf-8\"><title>T</title><style>@page { margin: 2cm; }</style></head><body><p>x</p></body></html>";
        let doc = parse_html(html).unwrap();
        assert_eq!(doc.blocks.len(), 1);
        assert!(doc.stylesheet.contains("margin: 2cm"));
    }

    #[test]
    fn breaks_become_newlines() {
        let doc = parse_html("<p>one<br />\ntwo<br>three</p>").unwrap();
        match &doc.blocks[0] {
            Block::Paragraph { runs, .. } => assert_eq!(text_of(runs), "one\n two\nthree"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nested_lists() {
        let html = "<ul>\n<li>a\n<ul>\n<li>b</li>\n</ul>\n</li>\n</ul>\n<ol start=\"3\"><li>c</li><li>d</li></ol>";
        let doc = parse_html(html).unwrap();
        let items: Vec<_> = doc
            .blocks
            .iter()
            .map(|b| match b {
                Block::ListItem { depth, marker, runs } => (*depth, marker.clone(), text_of(runs)),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            items,
            [
                (1, "•".to_string(), "a".to_string()),
                (2, "•".to_string(), "b".to_string()),
                (1, "3.".to_string(), "c".to_string()),
                (1, "4.".to_string(), "d".to_string()),
            ]
        );
    }

    #[test]
    fn code_preserves_whitespace() {
        let doc = parse_html("<pre><code class=\"language-rust\">fn main() {\n    x &lt; y\n}\n</code></pre>").unwrap();
        assert_eq!(
            doc.blocks,
            [Block::Code {
                text: "fn main() {\n    x < y\n}".into()
            }]
        );
    }

    #[test]
    fn tables_with_header() {
        let html = "<table>\n<thead>\n<tr>\n<th>指标</th>\n<th>值</th>\n</tr>\n</thead>\n<tbody>\n<tr>\n<td>PE</td>\n<td>12</td>\n</tr>\n</tbody>\n</table>";
        let doc = parse_html(html).unwrap();
        match &doc.blocks[0] {
            Block::Table { header, rows } => {
                let header = header.as_ref().unwrap();
                assert_eq!(text_of(&header[0]), "指标");
                assert!(header[0][0].bold);
                assert_eq!(rows.len(), 1);
                assert_eq!(text_of(&rows[0][1]), "12");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn blockquote_depth() {
        let doc = parse_html("<blockquote>\n<p>quoted</p>\n</blockquote>\n<p>after</p>").unwrap();
        assert!(matches!(&doc.blocks[0], Block::Paragraph { quote_depth: 1, .. }));
        assert!(matches!(&doc.blocks[1], Block::Paragraph { quote_depth: 0, .. }));
    }

    #[test]
    fn stray_end_tag_is_tolerated() {
        let doc = parse_html("<p>前竖排</div>后</p><hr />").unwrap();
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(doc.blocks[1], Block::Rule);
    }

    #[test]
    fn unknown_entity_falls_back() {
        let doc = parse_html("<p>a&nbsp;b</p>").unwrap();
        match &doc.blocks[0] {
            Block::Paragraph { runs, .. } => assert_eq!(text_of(runs), "a\u{a0}b"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
