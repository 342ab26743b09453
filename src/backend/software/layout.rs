//! Page layout: blocks → positioned drawing operations.
//!
//! The layouter walks the block list top to bottom with a single cursor,
//! starting a new page whenever the next line (or table row) would cross the
//! bottom margin. Coordinates in [`DrawOp`] are PDF user space: points, origin
//! at the bottom-left corner of the page.

use super::blocks::{Block, Run};
use super::fonts::PageFont;

const BODY_SIZE: f32 = 10.0;
const CODE_SIZE: f32 = 9.0;
const TABLE_SIZE: f32 = 9.0;
const FOOTER_SIZE: f32 = 8.0;
const LINE_FACTOR: f32 = 1.5;
const PARAGRAPH_GAP: f32 = 6.0;
const LIST_INDENT: f32 = 18.0;
const QUOTE_INDENT: f32 = 14.0;
const CELL_PADDING: f32 = 4.0;
const CODE_PADDING: f32 = 6.0;
const HEADING_SIZES: [f32; 6] = [18.0, 16.0, 14.0, 12.0, 11.0, 10.0];

/// Page size and uniform margin, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl Geometry {
    pub fn content_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    fn bottom(&self) -> f32 {
        self.height - self.margin
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Text with its baseline starting at `(x, y)`.
    Text {
        x: f32,
        y: f32,
        size: f32,
        bold: bool,
        text: String,
    },
    /// Filled rectangle with lower-left corner `(x, y)`.
    Fill { x: f32, y: f32, w: f32, h: f32, gray: f32 },
    /// Stroked rectangle with lower-left corner `(x, y)`.
    Frame { x: f32, y: f32, w: f32, h: f32, gray: f32 },
    Line { x1: f32, y1: f32, x2: f32, y2: f32, width: f32, gray: f32 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<DrawOp>,
}

/// Lay out `blocks` on pages of `geometry`. Always returns at least one page.
pub fn layout(blocks: &[Block], font: &PageFont<'_>, geometry: Geometry) -> Vec<Page> {
    let mut l = Layouter {
        font,
        geo: geometry,
        pages: vec![Page::default()],
        top: geometry.margin,
    };
    for block in blocks {
        match block {
            Block::Heading { level, runs } => l.heading(*level, runs),
            Block::Paragraph { runs, quote_depth } => l.paragraph(runs, *quote_depth),
            Block::ListItem { depth, marker, runs } => l.list_item(*depth, marker, runs),
            Block::Code { text } => l.code(text),
            Block::Rule => l.rule(),
            Block::Table { header, rows } => l.table(header.as_deref(), rows),
        }
    }
    l.number_pages();
    l.pages
}

// ── Line wrapping ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Line {
    pub segments: Vec<Run>,
    pub width: f32,
}

impl Line {
    fn push(&mut self, text: &str, bold: bool, width: f32) {
        match self.segments.last_mut() {
            Some(last) if last.bold == bold => last.text.push_str(text),
            _ => self.segments.push(Run {
                text: text.to_string(),
                bold,
            }),
        }
        self.width += width;
    }

    fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

enum Token {
    Break,
    Space(bool),
    Word(String, bool),
}

fn tokenize(runs: &[Run]) -> Vec<Token> {
    let mut tokens = Vec::new();
    for run in runs {
        let mut word = String::new();
        for c in run.text.chars() {
            if c == '\n' || (c.is_whitespace() && c != '\u{a0}') || is_cjk(c) {
                if !word.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut word), run.bold));
                }
                if c == '\n' {
                    tokens.push(Token::Break);
                } else if is_cjk(c) {
                    tokens.push(Token::Word(c.to_string(), run.bold));
                } else if !matches!(tokens.last(), Some(Token::Space(_))) {
                    tokens.push(Token::Space(run.bold));
                }
            } else {
                word.push(c);
            }
        }
        if !word.is_empty() {
            tokens.push(Token::Word(word, run.bold));
        }
    }
    tokens
}

/// CJK ideographs, kana, hangul and full-width forms may break anywhere.
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x11FF
        | 0x2E80..=0x9FFF
        | 0xA960..=0xA97F
        | 0xAC00..=0xD7AF
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFFEF
        | 0x20000..=0x2FFFF)
}

/// Greedy line breaking of styled runs into lines no wider than `max_width`.
///
/// CJK characters break anywhere, other words at spaces; a word wider than
/// the line is split by character. Spaces at line starts are dropped.
pub fn wrap_runs(runs: &[Run], font: &PageFont<'_>, size: f32, max_width: f32) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut line = Line::default();
    let mut space: Option<bool> = None;

    for token in tokenize(runs) {
        match token {
            Token::Break => {
                lines.push(std::mem::take(&mut line));
                space = None;
            }
            Token::Space(bold) => {
                if !line.is_empty() {
                    space = Some(bold);
                }
            }
            Token::Word(word, bold) => {
                let word_w = font.text_width(&word, size, bold);
                let space_w = space.map_or(0.0, |b| font.char_width(' ', size, b));
                if line.width + space_w + word_w <= max_width {
                    if let Some(b) = space.take() {
                        line.push(" ", b, space_w);
                    }
                    line.push(&word, bold, word_w);
                    continue;
                }
                space = None;
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                if word_w <= max_width {
                    line.push(&word, bold, word_w);
                    continue;
                }
                for c in word.chars() {
                    let cw = font.char_width(c, size, bold);
                    if line.width + cw > max_width && !line.is_empty() {
                        lines.push(std::mem::take(&mut line));
                    }
                    let mut buf = [0u8; 4];
                    line.push(c.encode_utf8(&mut buf), bold, cw);
                }
            }
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Character wrapping that keeps every space, for preformatted text.
fn wrap_preformatted(text: &str, font: &PageFont<'_>, size: f32, max_width: f32) -> Vec<Line> {
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let raw = raw.replace('\t', "    ");
        let mut line = Line::default();
        for c in raw.chars() {
            let cw = font.char_width(c, size, false);
            if line.width + cw > max_width && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            let mut buf = [0u8; 4];
            line.push(c.encode_utf8(&mut buf), false, cw);
        }
        lines.push(line);
    }
    lines
}

// ── Layouter ─────────────────────────────────────────────────────────────

struct Layouter<'f, 'a> {
    font: &'f PageFont<'a>,
    geo: Geometry,
    pages: Vec<Page>,
    /// Cursor, measured down from the top edge of the page.
    top: f32,
}

impl Layouter<'_, '_> {
    fn ops(&mut self) -> &mut Vec<DrawOp> {
        // `pages` is never empty.
        let last = self.pages.len() - 1;
        &mut self.pages[last].ops
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.top = self.geo.margin;
    }

    /// Start a new page unless `height` still fits below the cursor.
    fn ensure(&mut self, height: f32) {
        let at_page_top = (self.top - self.geo.margin).abs() < f32::EPSILON;
        if self.top + height > self.geo.bottom() && !at_page_top {
            self.new_page();
        }
    }

    fn y(&self, top: f32) -> f32 {
        self.geo.height - top
    }

    fn draw_line(&mut self, line: &Line, x: f32, line_top: f32, size: f32, line_height: f32) {
        let baseline = line_top + (line_height - size) / 2.0 + size * 0.8;
        let y = self.y(baseline);
        let mut x = x;
        for seg in &line.segments {
            let w = self.font.text_width(&seg.text, size, seg.bold);
            if !seg.text.trim().is_empty() {
                self.ops().push(DrawOp::Text {
                    x,
                    y,
                    size,
                    bold: seg.bold,
                    text: seg.text.clone(),
                });
            }
            x += w;
        }
    }

    fn flow(&mut self, lines: &[Line], x: f32, size: f32) {
        let lh = size * LINE_FACTOR;
        for line in lines {
            self.ensure(lh);
            let top = self.top;
            self.draw_line(line, x, top, size, lh);
            self.top += lh;
        }
    }

    fn heading(&mut self, level: u8, runs: &[Run]) {
        let size = HEADING_SIZES[usize::from(level.clamp(1, 6)) - 1];
        let runs: Vec<Run> = runs
            .iter()
            .map(|r| Run {
                text: r.text.clone(),
                bold: true,
            })
            .collect();
        let width = self.geo.content_width();
        let lines = wrap_runs(&runs, self.font, size, width);
        let lh = size * 1.3;

        self.top += size * 0.6;
        // Keep the heading together with the first line after it.
        self.ensure(lines.len() as f32 * lh + BODY_SIZE * LINE_FACTOR);
        for line in &lines {
            let top = self.top;
            self.draw_line(line, self.geo.margin, top, size, lh);
            self.top += lh;
        }
        if level <= 2 {
            let y = self.y(self.top + 2.0);
            let (x1, x2) = (self.geo.margin, self.geo.width - self.geo.margin);
            let width = if level == 1 { 1.5 } else { 0.75 };
            self.ops().push(DrawOp::Line {
                x1,
                y1: y,
                x2,
                y2: y,
                width,
                gray: 0.8,
            });
            self.top += 4.0;
        }
        self.top += size * 0.3;
    }

    fn paragraph(&mut self, runs: &[Run], quote_depth: usize) {
        let indent = quote_depth as f32 * QUOTE_INDENT;
        let x = self.geo.margin + indent;
        let lines = wrap_runs(runs, self.font, BODY_SIZE, self.geo.content_width() - indent);
        if quote_depth == 0 {
            self.flow(&lines, x, BODY_SIZE);
        } else {
            let lh = BODY_SIZE * LINE_FACTOR;
            let bar_x = x - QUOTE_INDENT / 2.0;
            for line in &lines {
                self.ensure(lh);
                let top = self.top;
                let (y1, y2) = (self.y(top), self.y(top + lh));
                self.ops().push(DrawOp::Line {
                    x1: bar_x,
                    y1,
                    x2: bar_x,
                    y2,
                    width: 2.0,
                    gray: 0.7,
                });
                self.draw_line(line, x, top, BODY_SIZE, lh);
                self.top += lh;
            }
        }
        self.top += PARAGRAPH_GAP;
    }

    fn list_item(&mut self, depth: usize, marker: &str, runs: &[Run]) {
        let indent = depth as f32 * LIST_INDENT;
        let x = self.geo.margin + indent;
        let lines = wrap_runs(runs, self.font, BODY_SIZE, self.geo.content_width() - indent);
        let lh = BODY_SIZE * LINE_FACTOR;

        let marker = if self.font.has_glyph('•') || marker != "•" {
            marker.to_string()
        } else {
            "-".to_string()
        };
        let marker_w = self.font.text_width(&marker, BODY_SIZE, false);

        for (i, line) in lines.iter().enumerate() {
            self.ensure(lh);
            let top = self.top;
            if i == 0 {
                let marker_line = Line {
                    segments: vec![Run {
                        text: marker.clone(),
                        bold: false,
                    }],
                    width: marker_w,
                };
                self.draw_line(&marker_line, x - marker_w - 4.0, top, BODY_SIZE, lh);
            }
            self.draw_line(line, x, top, BODY_SIZE, lh);
            self.top += lh;
        }
        self.top += 2.0;
    }

    fn code(&mut self, text: &str) {
        let lh = CODE_SIZE * 1.4;
        let width = self.geo.content_width();
        let lines = wrap_preformatted(text, self.font, CODE_SIZE, width - 2.0 * CODE_PADDING);
        let x = self.geo.margin;

        self.ensure(CODE_PADDING + lh);
        self.shade(x, self.top, width, CODE_PADDING);
        self.top += CODE_PADDING;
        for line in &lines {
            self.ensure(lh);
            let top = self.top;
            self.shade(x, top, width, lh);
            self.draw_line(line, x + CODE_PADDING, top, CODE_SIZE, lh);
            self.top += lh;
        }
        self.ensure(CODE_PADDING);
        let top = self.top;
        self.shade(x, top, width, CODE_PADDING);
        self.top += CODE_PADDING + PARAGRAPH_GAP;
    }

    fn shade(&mut self, x: f32, top: f32, w: f32, h: f32) {
        let y = self.y(top + h);
        self.ops().push(DrawOp::Fill {
            x,
            y,
            w,
            h,
            gray: 0.95,
        });
    }

    fn rule(&mut self) {
        self.ensure(12.0);
        let y = self.y(self.top + 6.0);
        let (x1, x2) = (self.geo.margin, self.geo.width - self.geo.margin);
        self.ops().push(DrawOp::Line {
            x1,
            y1: y,
            x2,
            y2: y,
            width: 1.0,
            gray: 0.85,
        });
        self.top += 12.0;
    }

    fn table(&mut self, header: Option<&[Vec<Run>]>, rows: &[Vec<Vec<Run>>]) {
        let cols = rows
            .iter()
            .map(Vec::len)
            .chain(header.map(<[_]>::len))
            .max()
            .unwrap_or(0)
            .max(1);
        let col_w = self.geo.content_width() / cols as f32;
        let lh = TABLE_SIZE * 1.4;

        let wrap_row = |row: &[Vec<Run>], bold: bool| -> (Vec<Vec<Line>>, f32) {
            let cells: Vec<Vec<Line>> = (0..cols)
                .map(|i| {
                    let runs: Vec<Run> = row
                        .get(i)
                        .map(|cell| {
                            cell.iter()
                                .map(|r| Run {
                                    text: r.text.clone(),
                                    bold: r.bold || bold,
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    wrap_runs(&runs, self.font, TABLE_SIZE, col_w - 2.0 * CELL_PADDING)
                })
                .collect();
            let n = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);
            let height = n as f32 * lh + 2.0 * CELL_PADDING;
            (cells, height)
        };

        let header = header.map(|h| wrap_row(h, true));
        let body: Vec<_> = rows.iter().map(|r| wrap_row(r, false)).collect();

        self.top += 4.0;
        let first = header.as_ref().map_or(0.0, |h| h.1) + body.first().map_or(0.0, |r| r.1);
        self.ensure(first);
        if let Some((cells, h)) = &header {
            self.table_row(cells, *h, col_w, lh, true);
        }
        for (cells, h) in &body {
            let before = self.pages.len();
            self.ensure(*h);
            if self.pages.len() != before {
                if let Some((hcells, hh)) = &header {
                    self.table_row(hcells, *hh, col_w, lh, true);
                }
            }
            self.table_row(cells, *h, col_w, lh, false);
        }
        self.top += PARAGRAPH_GAP + 4.0;
    }

    fn table_row(&mut self, cells: &[Vec<Line>], height: f32, col_w: f32, lh: f32, header: bool) {
        let top = self.top;
        let y = self.y(top + height);
        let x0 = self.geo.margin;
        if header {
            self.ops().push(DrawOp::Fill {
                x: x0,
                y,
                w: col_w * cells.len() as f32,
                h: height,
                gray: 0.93,
            });
        }
        for (i, lines) in cells.iter().enumerate() {
            let x = x0 + i as f32 * col_w;
            self.ops().push(DrawOp::Frame {
                x,
                y,
                w: col_w,
                h: height,
                gray: 0.6,
            });
            for (j, line) in lines.iter().enumerate() {
                let line_top = top + CELL_PADDING + j as f32 * lh;
                self.draw_line(line, x + CELL_PADDING, line_top, TABLE_SIZE, lh);
            }
        }
        self.top += height;
    }

    fn number_pages(&mut self) {
        let total = self.pages.len();
        let y = self.geo.margin / 2.0;
        for (i, page) in self.pages.iter_mut().enumerate() {
            let label = format!("{} / {}", i + 1, total);
            let w = self.font.text_width(&label, FOOTER_SIZE, false);
            page.ops.push(DrawOp::Text {
                x: (self.geo.width - w) / 2.0,
                y,
                size: FOOTER_SIZE,
                bold: false,
                text: label,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: Geometry = Geometry {
        width: 595.28,
        height: 841.89,
        margin: 56.69,
    };

    fn run(text: &str) -> Vec<Run> {
        vec![Run {
            text: text.into(),
            bold: false,
        }]
    }

    fn line_text(line: &Line) -> String {
        line.segments.iter().map(|s| s.text.as_str()).collect()
    }

    fn texts(page: &Page) -> Vec<&str> {
        page.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn wraps_latin_at_spaces() {
        let font = PageFont::Builtin;
        let lines = wrap_runs(&run("aaa bbb ccc"), &font, 10.0, font.text_width("aaa bbb", 10.0, false) + 0.1);
        let got: Vec<_> = lines.iter().map(line_text).collect();
        assert_eq!(got, ["aaa bbb", "ccc"]);
        assert!(lines.iter().all(|l| l.width <= font.text_width("aaa bbb", 10.0, false) + 0.1));
    }

    #[test]
    fn cjk_breaks_anywhere() {
        let font = PageFont::Builtin;
        let three = font.text_width("中中中", 10.0, false) + 0.01;
        let lines = wrap_runs(&run("中文中文中文"), &font, 10.0, three);
        assert_eq!(lines.len(), 2);
        assert_eq!(line_text(&lines[0]).chars().count(), 3);
    }

    #[test]
    fn long_word_split_by_character() {
        let font = PageFont::Builtin;
        let max = font.text_width("0123", 10.0, false) + 0.01;
        let lines = wrap_runs(&run("0123456789"), &font, 10.0, max);
        let got: Vec<_> = lines.iter().map(line_text).collect();
        assert_eq!(got, ["0123", "4567", "89"]);
    }

    #[test]
    fn forced_breaks_and_leading_space() {
        let font = PageFont::Builtin;
        let lines = wrap_runs(&run("one\n two"), &font, 10.0, 500.0);
        let got: Vec<_> = lines.iter().map(line_text).collect();
        assert_eq!(got, ["one", "two"]);
    }

    #[test]
    fn bold_segments_kept_apart() {
        let font = PageFont::Builtin;
        let runs = vec![
            Run { text: "plain ".into(), bold: false },
            Run { text: "bold".into(), bold: true },
        ];
        let lines = wrap_runs(&runs, &font, 10.0, 500.0);
        assert_eq!(lines[0].segments.len(), 2);
        assert!(lines[0].segments[1].bold);
    }

    #[test]
    fn overflow_starts_new_pages_with_numbers() {
        let blocks: Vec<Block> = (0..200)
            .map(|i| Block::Paragraph {
                runs: run(&format!("paragraph {i}")),
                quote_depth: 0,
            })
            .collect();
        let pages = layout(&blocks, &PageFont::Builtin, A4);
        assert!(pages.len() > 1);
        let total = pages.len();
        for (i, page) in pages.iter().enumerate() {
            assert!(texts(page).contains(&format!("{} / {}", i + 1, total).as_str()));
            for op in &page.ops {
                if let DrawOp::Text { y, .. } = op {
                    assert!(*y >= 0.0 && *y <= A4.height);
                }
            }
        }
    }

    #[test]
    fn table_header_repeats_on_every_page() {
        let header = vec![run("Metric"), run("Value")];
        let rows: Vec<Vec<Vec<Run>>> = (0..150)
            .map(|i| vec![run(&format!("row {i}")), run("1")])
            .collect();
        let blocks = vec![Block::Table {
            header: Some(header),
            rows,
        }];
        let pages = layout(&blocks, &PageFont::Builtin, A4);
        assert!(pages.len() > 1);
        for page in &pages {
            assert!(texts(page).contains(&"Metric"), "header missing on a page");
        }
    }

    #[test]
    fn empty_document_has_one_page() {
        let pages = layout(&[], &PageFont::Builtin, A4);
        assert_eq!(pages.len(), 1);
        assert_eq!(texts(&pages[0]), ["1 / 1"]);
    }

    #[test]
    fn code_block_is_shaded() {
        let blocks = vec![Block::Code {
            text: "let x = 1;\n\nlet y = 2;".into(),
        }];
        let pages = layout(&blocks, &PageFont::Builtin, A4);
        let fills = pages[0]
            .ops
            .iter()
            .filter(|op| matches!(op, DrawOp::Fill { .. }))
            .count();
        assert_eq!(fills, 5);
        assert!(texts(&pages[0]).contains(&"let x = 1;"));
    }

    #[test]
    fn cjk_detection() {
        assert!(is_cjk('中'));
        assert!(is_cjk('。'));
        assert!(is_cjk('ア'));
        assert!(!is_cjk('a'));
        assert!(!is_cjk('é'));
    }
}
