//! Markdown → HTML rendering for the PDF engines.
//!
//! Two documents are produced from the same sanitized Markdown:
//!
//! - [`render_html`]: the print stylesheet for the primary engine
//!   (wkhtmltopdf). Every element is forced left-to-right, page breaks avoid
//!   splitting headings from their content and rows from themselves, table
//!   headers repeat on each page, and the running header/footer carry the
//!   document title and page counter.
//! - [`render_standalone_html`]: a self-contained page for the software
//!   renderer. It declares the located CJK font through `@font-face` so the
//!   renderer can embed it.

use once_cell::sync::Lazy;
use crate::config::PageSetup;
use pulldown_cmark::{html, Event, Options, Parser};
use std::path::Path;

/// Font stack used when the engine resolves fonts by family name.
pub const CJK_FONT_STACK: &str =
    r#""Noto Sans CJK SC", "Microsoft YaHei", "SimHei", "Arial", sans-serif"#;

/// Family name bound to the located font file in the standalone document.
pub const EMBEDDED_FONT_FAMILY: &str = "ChineseFont";

static MARKDOWN_OPTIONS: Lazy<Options> =
    Lazy::new(|| Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);

/// Convert Markdown to an HTML fragment.
///
/// GFM tables and fenced code are enabled; single newlines inside a paragraph
/// become `<br />`.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, *MARKDOWN_OPTIONS).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Render the full print document for the primary PDF engine.
///
/// The `@page` rule is built from `page`, so it agrees with the engine's own
/// page arguments.
pub fn render_html(markdown: &str, title: &str, lang: &str, page: &PageSetup) -> String {
    let body = markdown_to_html(markdown);
    let size = page.size.name();
    let margin = page.margin_arg();
    let title_html = escape_html(title);
    let title_css = escape_css_string(title);
    let lang = escape_html(lang);
    format!(
        r#"<!DOCTYPE html>
<html lang="{lang}" dir="ltr">
<head>
<meta charset="UTF-8">
<title>{title_html}</title>
<style>
* {{
    direction: ltr !important;
    unicode-bidi: normal;
}}
html {{
    direction: ltr;
}}
body {{
    font-family: {CJK_FONT_STACK};
    line-height: 1.8;
    color: #333;
    margin: 0;
    padding: 0;
    background: white;
}}
h1, h2, h3, h4, h5, h6 {{
    color: #2c3e50;
    margin-top: 1.5em;
    margin-bottom: 0.8em;
    font-weight: 600;
    page-break-after: avoid;
}}
h1 {{
    font-size: 2em;
    border-bottom: 3px solid #3498db;
    padding-bottom: 0.3em;
}}
h2 {{
    font-size: 1.6em;
    border-bottom: 2px solid #bdc3c7;
    padding-bottom: 0.25em;
}}
h3 {{
    font-size: 1.3em;
    color: #34495e;
}}
p {{
    margin: 0.8em 0;
    text-align: left;
}}
table {{
    width: 100%;
    border-collapse: collapse;
    margin: 1.5em 0;
    font-size: 0.9em;
    page-break-inside: auto;
}}
thead {{
    display: table-header-group;
}}
tbody {{
    display: table-row-group;
}}
tr {{
    page-break-inside: avoid;
    page-break-after: auto;
}}
th, td {{
    border: 1px solid #ddd;
    padding: 10px 12px;
    text-align: left;
}}
th {{
    background-color: #3498db;
    color: white;
    font-weight: bold;
}}
tbody tr:nth-child(even) {{
    background-color: #f8f9fa;
}}
code {{
    background-color: #f4f4f4;
    padding: 2px 6px;
    border-radius: 3px;
    font-family: "Consolas", "Monaco", "Courier New", monospace;
    font-size: 0.9em;
}}
pre {{
    background-color: #f4f4f4;
    padding: 15px;
    border-radius: 5px;
    border-left: 4px solid #3498db;
    white-space: pre-wrap;
    word-wrap: break-word;
    page-break-inside: avoid;
}}
pre code {{
    background-color: transparent;
    padding: 0;
}}
ul, ol {{
    margin: 0.8em 0;
    padding-left: 2em;
}}
li {{
    margin: 0.4em 0;
    page-break-inside: avoid;
}}
p, li {{
    orphans: 3;
    widows: 3;
}}
hr {{
    border: none;
    border-top: 2px solid #ecf0f1;
    margin: 2em 0;
}}
a {{
    color: #3498db;
    text-decoration: none;
}}
img {{
    max-width: 100%;
    height: auto;
    page-break-inside: avoid;
}}
blockquote {{
    margin: 1em 0;
    padding: 0.5em 1em;
    border-left: 4px solid #3498db;
    background-color: #f8f9fa;
    font-style: italic;
    page-break-inside: avoid;
}}
@page {{
    size: {size};
    margin: {margin};
    @top-center {{
        content: "{title_css}";
        font-size: 10pt;
        color: #999;
    }}
    @bottom-right {{
        content: counter(page);
        font-size: 10pt;
        color: #999;
    }}
}}
</style>
</head>
<body dir="ltr">
{body}
</body>
</html>
"#
    )
}

/// Render the self-contained document for the software renderer.
///
/// With `font` set, the file is declared as [`EMBEDDED_FONT_FAMILY`]; without
/// it the body falls back to generic sans-serif.
pub fn render_standalone_html(markdown: &str, font: Option<&Path>, page: &PageSetup) -> String {
    let body = markdown_to_html(markdown);
    let size = page.size.name();
    let margin = page.margin_arg();
    let (font_face, family) = match font {
        Some(path) => {
            let url = escape_css_string(&path.to_string_lossy().replace('\\', "/"));
            (
                format!(
                    "@font-face {{\n    font-family: '{EMBEDDED_FONT_FAMILY}';\n    src: url('{url}');\n}}\n"
                ),
                format!("'{EMBEDDED_FONT_FAMILY}', sans-serif"),
            )
        }
        None => (String::new(), "sans-serif".to_string()),
    };
    format!(
        r#"<!DOCTYPE html>
<html dir="ltr">
<head>
<meta charset="utf-8"/>
<style>
@page {{
    size: {size};
    margin: {margin};
}}
{font_face}body {{
    font-family: {family};
    font-size: 10pt;
    line-height: 1.5;
}}
h1 {{ font-size: 18pt; color: #2c3e50; font-weight: bold; }}
h2 {{ font-size: 16pt; color: #34495e; font-weight: bold; }}
h3 {{ font-size: 14pt; color: #7f8c8d; font-weight: bold; }}
table {{ width: 100%; border-collapse: collapse; }}
th {{ background-color: #f2f2f2; font-weight: bold; border: 1px solid #ccc; }}
td {{ border: 1px solid #ccc; }}
pre {{ background-color: #f8f8f8; border: 1px solid #ddd; white-space: pre-wrap; }}
</style>
</head>
<body>
{body}
</body>
</html>
"#
    )
}

/// Escape text for an HTML element or attribute.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape text for a quoted CSS string.
fn escape_css_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '<' => out.push_str("\\3c "),
            '\n' | '\r' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}
