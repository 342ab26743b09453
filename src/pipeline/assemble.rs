//! Markdown assembly: [`ReportDocument`] → canonical Markdown.
//!
//! The canonical Markdown is the single intermediate every format starts
//! from, so section order and emptiness rules are decided here once:
//!
//! 1. Title and metadata block, closed by a horizontal rule
//! 2. Executive summary (only when non-empty)
//! 3. Well-known sections in [`SECTION_ORDER`] (only when the trimmed body
//!    is non-empty)
//! 4. Any other sections in input order, headed by their raw key
//! 5. Footer
//!
//! Lines are joined with `\n`; the output has no trailing newline after the
//! final blank line. The function is pure: equal inputs give byte-identical
//! output.

use crate::config::ReportLabels;
use crate::document::{ReportDocument, SECTION_ORDER};
use tracing::debug;

/// Build the canonical Markdown for `doc` using `labels`.
pub fn assemble_markdown(doc: &ReportDocument, labels: &ReportLabels) -> String {
    let mut lines: Vec<String> = vec![
        format!("# {} {}", doc.stock_symbol, labels.title_suffix),
        String::new(),
        format!("**{}**: {}", labels.date_label, doc.analysis_date),
    ];
    if !doc.analysts.is_empty() {
        lines.push(format!(
            "**{}**: {}",
            labels.analysts_label,
            doc.analysts.join(", ")
        ));
    }
    lines.push(format!("**{}**: {}", labels.depth_label, doc.research_depth));
    push_rule(&mut lines);

    if let Some(summary) = doc.summary.as_deref().filter(|s| !s.is_empty()) {
        push_section(&mut lines, &labels.summary_title, summary);
    }
    for (title, body) in section_plan(doc, labels) {
        push_section(&mut lines, title, body);
    }

    lines.push(String::new());
    lines.push("---".into());
    lines.push(String::new());
    lines.push(format!("*{}*", labels.footer));
    lines.push(String::new());

    let markdown = lines.join("\n");
    debug!(
        symbol = %doc.stock_symbol,
        chars = markdown.chars().count(),
        "Assembled markdown report"
    );
    markdown
}

fn push_rule(lines: &mut Vec<String>) {
    lines.push(String::new());
    lines.push("---".into());
    lines.push(String::new());
}

fn push_section(lines: &mut Vec<String>, title: &str, body: &str) {
    lines.push(format!("## {title}"));
    lines.push(String::new());
    lines.push(body.to_string());
    push_rule(lines);
}

/// Sections to emit, in output order, as `(title, body)` pairs.
///
/// Known keys come first in [`SECTION_ORDER`] with their localized title;
/// unknown keys follow in input order with the raw key as title. Bodies that
/// are blank after trimming are skipped.
pub fn section_plan<'a>(doc: &'a ReportDocument, labels: &'a ReportLabels) -> Vec<(&'a str, &'a str)> {
    let known = SECTION_ORDER
        .iter()
        .zip(labels.section_titles.iter())
        .filter_map(|(key, title)| {
            doc.reports
                .get(key)
                .filter(|body| !body.trim().is_empty())
                .map(|body| (title.as_str(), body))
        });

    let extra = doc
        .reports
        .iter()
        .filter(|(key, body)| !SECTION_ORDER.contains(key) && !body.trim().is_empty());

    known.chain(extra).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ResearchDepth;
    use proptest::prelude::*;

    fn sample() -> ReportDocument {
        ReportDocument::new("000001")
            .with_date("2025-01-15")
            .with_analysts(["market", "fundamental"])
            .with_section("company_overview", "Stable earnings.")
            .with_section("risk_analysis", "")
    }

    #[test]
    fn exact_layout() {
        let md = assemble_markdown(&sample(), &ReportLabels::chinese());
        let expected = [
            "# 000001 股票分析报告",
            "",
            "**分析日期**: 2025-01-15",
            "**分析师**: market, fundamental",
            "**研究深度**: 1",
            "",
            "---",
            "",
            "## 公司概况",
            "",
            "Stable earnings.",
            "",
            "---",
            "",
            "",
            "---",
            "",
            "*本报告由 TradingAgents-CN 自动生成*",
            "",
        ]
        .join("\n");
        assert_eq!(md, expected);
    }

    #[test]
    fn empty_section_has_no_heading() {
        let md = assemble_markdown(&sample(), &ReportLabels::chinese());
        assert!(md.contains("Stable earnings."));
        assert!(!md.contains("风险分析"));
    }

    #[test]
    fn whitespace_only_section_is_omitted() {
        let doc = sample().with_section("valuation_analysis", "  \n\t ");
        let md = assemble_markdown(&doc, &ReportLabels::chinese());
        assert!(!md.contains("估值分析"));
    }

    #[test]
    fn analysts_line_omitted_when_empty() {
        let doc = ReportDocument::new("AAPL");
        let md = assemble_markdown(&doc, &ReportLabels::english());
        assert!(!md.contains("**Analysts**"));
        assert!(md.starts_with("# AAPL Stock Analysis Report\n\n**Analysis Date**: \n**Research Depth**: 1\n"));
    }

    #[test]
    fn summary_block_precedes_sections() {
        let doc = sample().with_summary("Buy.");
        let md = assemble_markdown(&doc, &ReportLabels::chinese());
        let s = md.find("## 执行摘要\n\nBuy.\n\n---\n").unwrap();
        let c = md.find("## 公司概况").unwrap();
        assert!(s < c);
    }

    #[test]
    fn empty_summary_is_omitted() {
        let doc = sample().with_summary("");
        let md = assemble_markdown(&doc, &ReportLabels::chinese());
        assert!(!md.contains("执行摘要"));
    }

    #[test]
    fn priority_then_extras_in_input_order() {
        let doc = ReportDocument::new("X")
            .with_section("zz_custom", "custom")
            .with_section("investment_recommendation", "rec")
            .with_section("aa_custom", "another")
            .with_section("company_overview", "overview");
        let md = assemble_markdown(&doc, &ReportLabels::english());
        let pos = |needle: &str| md.find(needle).unwrap();
        assert!(pos("## Company Overview") < pos("## Investment Recommendation"));
        assert!(pos("## Investment Recommendation") < pos("## zz_custom"));
        assert!(pos("## zz_custom") < pos("## aa_custom"));
    }

    #[test]
    fn label_depth_renders_verbatim() {
        let doc = ReportDocument::new("X").with_depth(ResearchDepth::Label("全面".into()));
        let md = assemble_markdown(&doc, &ReportLabels::chinese());
        assert!(md.contains("**研究深度**: 全面"));
    }

    proptest! {
        #[test]
        fn assembly_is_deterministic_and_ordered(
            bodies in proptest::collection::vec("[a-z ]{0,12}", 7),
            extras in proptest::collection::vec(("x_[a-z]{1,6}", "[a-z]{1,8}"), 0..4),
        ) {
            let mut doc = ReportDocument::new("P");
            for (key, body) in extras.iter().map(|(k, v)| (k.as_str(), v.as_str()))
                .chain(SECTION_ORDER.iter().copied().zip(bodies.iter().map(String::as_str)))
            {
                doc = doc.with_section(key, body);
            }
            let labels = ReportLabels::english();
            let a = assemble_markdown(&doc, &labels);
            let b = assemble_markdown(&doc.clone(), &labels);
            prop_assert_eq!(&a, &b);

            let mut last = 0;
            for (title, _) in section_plan(&doc, &labels) {
                let at = a[last..].find(&format!("## {title}\n")).map(|i| i + last);
                prop_assert!(at.is_some());
                last = at.unwrap_or(last);
            }
            for (title, body) in SECTION_ORDER.iter().zip(labels.section_titles.iter())
                .map(|(k, t)| (t, doc.reports.get(k).unwrap_or("")))
            {
                prop_assert_eq!(a.contains(&format!("## {title}\n")), !body.trim().is_empty());
            }
        }
    }
}
