//! Content sanitization: strip constructs known to break the converters.
//!
//! Report bodies are free text produced upstream and occasionally carry
//! embedded HTML copied from web pages. Pandoc and the HTML engines react
//! badly to a few of those constructs:
//!
//! - a document starting with `---` is parsed as a YAML metadata block
//! - `writing-mode` / `text-orientation` declarations turn CJK text vertical
//! - inline `style` attributes carry the same declarations in many spellings
//! - `<style>` blocks leak into the body as literal CSS text
//!
//! ## Line protection
//!
//! Lines that are Markdown syntax (headings, list items, table rows,
//! blockquotes, rules) and every line of a fenced code block pass through
//! byte-for-byte. The rules only see the runs of ordinary lines between them.
//! A closed `<style>` block is never protected, whatever its CSS lines start
//! with, so rule 4 always sees it whole.
//!
//! ## Rule Order
//!
//! Rules 2–4 are applied to each run repeatedly until nothing changes. The
//! whole classify-and-strip pass then repeats until the text is stable, since
//! a removal can turn a line into a fence marker and change which lines are
//! protected. Every rule only removes text, so the loop terminates. Rule 1
//! runs last so that it sees the text the converter will see. Together this
//! makes `sanitize(sanitize(x)) == sanitize(x)`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every sanitization rule to `text`.
///
/// Rules:
/// 1. Prepend a blank line when the first line starts with `---`
/// 2. Remove HTML tags declaring `writing-mode` or `text-orientation`
/// 3. Remove `style` attributes from block/inline HTML tags, keeping the tag
/// 4. Remove `<style>…</style>` blocks
pub fn sanitize(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return guard_leading_rule(current);
        }
        current = next;
    }
}

/// One classification of `text` into protected lines and runs, with rules
/// 2–4 applied to every run.
fn sanitize_pass(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out: Vec<String> = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    let mut fence: Option<char> = None;
    // Index of the line closing the current `<style>` block.
    let mut style_end: Option<usize> = None;

    for (i, line) in lines.iter().copied().enumerate() {
        let protected = if let Some(end) = style_end {
            if i >= end {
                style_end = None;
            }
            false
        } else {
            match fence {
                Some(marker) => {
                    if fence_marker(line) == Some(marker) {
                        fence = None;
                    }
                    true
                }
                None => match style_block_end(&lines, i) {
                    Some(end) => {
                        style_end = (end > i).then_some(end);
                        false
                    }
                    None => {
                        if let Some(marker) = fence_marker(line) {
                            fence = Some(marker);
                            true
                        } else {
                            is_markdown_syntax(line)
                        }
                    }
                },
            }
        };

        if protected {
            flush_run(&mut run, &mut out);
            out.push(line.to_string());
        } else {
            run.push(line);
        }
    }
    flush_run(&mut run, &mut out);
    out.join("\n")
}

fn flush_run(run: &mut Vec<&str>, out: &mut Vec<String>) {
    if run.is_empty() {
        return;
    }
    out.push(strip_html(&run.join("\n")));
    run.clear();
}

/// Apply rules 2–4 until the text stops changing.
fn strip_html(input: &str) -> String {
    let mut current = input.to_string();
    loop {
        let next = strip_style_blocks(&strip_style_attributes(&strip_vertical_tags(&current)));
        if next == current {
            return current;
        }
        current = next;
    }
}

// ── Line classification ──────────────────────────────────────────────────

static RE_ORDERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.").unwrap());

/// `true` for headings, list items, table rows, blockquotes and rules.
fn is_markdown_syntax(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with(['#', '-', '*', '+', '|', '>']) || RE_ORDERED_ITEM.is_match(trimmed)
}

static RE_STYLE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<style[\s>]").unwrap());
static RE_STYLE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</style\s*>").unwrap());

/// Index of the line closing a `<style>` block opened on line `start`.
///
/// `None` when line `start` opens no block or the block is never closed.
fn style_block_end(lines: &[&str], start: usize) -> Option<usize> {
    let open = RE_STYLE_OPEN.find(lines[start])?;
    if RE_STYLE_CLOSE.is_match(&lines[start][open.end()..]) {
        return Some(start);
    }
    lines[start + 1..]
        .iter()
        .position(|line| RE_STYLE_CLOSE.is_match(line))
        .map(|offset| start + 1 + offset)
}

/// The fence character if `line` opens or closes a fenced code block.
fn fence_marker(line: &str) -> Option<char> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some('`')
    } else if trimmed.starts_with("~~~") {
        Some('~')
    } else {
        None
    }
}

// ── Rule 1: Guard a leading horizontal rule ──────────────────────────────

/// A leading `---` would open a YAML metadata block in pandoc.
fn guard_leading_rule(text: String) -> String {
    let first = text.split('\n').next().unwrap_or_default();
    if first.trim().starts_with("---") {
        format!("\n{text}")
    } else {
        text
    }
}

// ── Rule 2: Remove vertical-text tags ────────────────────────────────────

static RE_VERTICAL_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<[^>]*(?:writing-mode|text-orientation)[^>]*>").unwrap()
});

fn strip_vertical_tags(input: &str) -> String {
    RE_VERTICAL_TAG.replace_all(input, "").into_owned()
}

// ── Rule 3: Remove inline style attributes ───────────────────────────────

static RE_STYLE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?P<head><(?:div|span|p|section|font|td|th|table|tr|li|ul|ol|h[1-6]|blockquote)(?:\s[^>]*?)?)\s+style\s*=\s*(?:"[^"]*"|'[^']*')"#,
    )
    .unwrap()
});

fn strip_style_attributes(input: &str) -> String {
    RE_STYLE_ATTR.replace_all(input, "${head}").into_owned()
}

// ── Rule 4: Remove style blocks ──────────────────────────────────────────

static RE_STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());

fn strip_style_blocks(input: &str) -> String {
    RE_STYLE_BLOCK.replace_all(input, "").into_owned()
}
