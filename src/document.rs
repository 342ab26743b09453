//! Input data model: the structured report handed to the exporter.
//!
//! A [`ReportDocument`] mirrors the JSON documents produced by the analysis
//! service. Every field has a default so partially-filled reports still
//! export. Section bodies are kept in their input order; the assembler uses
//! that order for sections outside [`SECTION_ORDER`].

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Well-known section keys, in the order they appear in every format.
pub const SECTION_ORDER: [&str; 7] = [
    "company_overview",
    "financial_analysis",
    "technical_analysis",
    "market_analysis",
    "risk_analysis",
    "valuation_analysis",
    "investment_recommendation",
];

/// A multi-section analysis report.
///
/// # Example
/// ```rust
/// use report_export::ReportDocument;
///
/// let doc: ReportDocument = serde_json::from_str(
///     r#"{"stock_symbol": "000001", "reports": {"company_overview": "Stable earnings."}}"#,
/// ).unwrap();
/// assert_eq!(doc.analysis_date, "");
/// assert_eq!(doc.reports.get("company_overview"), Some("Stable earnings."));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    #[serde(default = "default_symbol", deserialize_with = "symbol_or_default")]
    pub stock_symbol: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub analysis_date: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub analysts: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub research_depth: ResearchDepth,

    #[serde(default)]
    pub reports: Sections,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

fn default_symbol() -> String {
    "unknown".to_string()
}

/// `null` reads as an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn symbol_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_symbol))
}

impl Default for ReportDocument {
    fn default() -> Self {
        Self {
            stock_symbol: default_symbol(),
            analysis_date: String::new(),
            analysts: Vec::new(),
            research_depth: ResearchDepth::default(),
            reports: Sections::default(),
            summary: None,
        }
    }
}

impl ReportDocument {
    /// Empty report for `symbol`.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            stock_symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.analysis_date = date.into();
        self
    }

    pub fn with_analysts<I, S>(mut self, analysts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.analysts = analysts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_depth(mut self, depth: impl Into<ResearchDepth>) -> Self {
        self.research_depth = depth.into();
        self
    }

    pub fn with_section(mut self, key: impl Into<String>, body: impl Into<String>) -> Self {
        self.reports.insert(key, body);
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

// ── Research depth ───────────────────────────────────────────────────────

/// Research depth, accepted as an integer level or a free-form label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResearchDepth {
    Level(i64),
    Label(String),
}

impl Default for ResearchDepth {
    fn default() -> Self {
        ResearchDepth::Level(1)
    }
}

impl fmt::Display for ResearchDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResearchDepth::Level(n) => write!(f, "{n}"),
            ResearchDepth::Label(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ResearchDepth {
    fn from(n: i64) -> Self {
        ResearchDepth::Level(n)
    }
}

impl From<&str> for ResearchDepth {
    fn from(s: &str) -> Self {
        ResearchDepth::Label(s.to_string())
    }
}

// ── Sections ─────────────────────────────────────────────────────────────

/// Section key → body, in insertion order.
///
/// Deserializes from a JSON object, keeping the object's key order and
/// silently dropping entries whose value is not a string. Re-inserting an
/// existing key replaces its body in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sections(Vec<(String, String)>);

impl Sections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, body: impl Into<String>) {
        let key = key.into();
        let body = body.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = body,
            None => self.0.push((key, body)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Sections {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut sections = Sections::new();
        for (k, v) in iter {
            sections.insert(k, v);
        }
        sections
    }
}

impl Serialize for Sections {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Sections {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SectionsVisitor;

        impl<'de> Visitor<'de> for SectionsVisitor {
            type Value = Sections;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of section key to section body")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Sections, A::Error> {
                let mut sections = Sections::new();
                while let Some((key, value)) =
                    access.next_entry::<String, serde_json::Value>()?
                {
                    if let serde_json::Value::String(body) = value {
                        sections.insert(key, body);
                    }
                }
                Ok(sections)
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Sections, E> {
                Ok(Sections::new())
            }
        }

        deserializer.deserialize_any(SectionsVisitor)
    }
}
