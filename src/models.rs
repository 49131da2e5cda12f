//! Data models for scraped records and research reports.
//!
//! This module defines the structures that flow out of the adapters and the
//! aggregator:
//! - [`Record`]: one normalized item (a story, a repository, a paper...)
//! - [`FieldValue`]: the open set of values a record field may hold
//! - [`SourceReport`]: everything one adapter produced during a run
//! - [`ResearchReport`]: the whole run, keyed by source id
//! - [`TopicReports`]: one report per topic for multi-topic runs
//! - [`PageContent`]: best-effort extraction of an arbitrary linked page
//!
//! There is no global schema. Each adapter picks its own field names and the
//! aggregator never reconciles them across sources.

use chrono::{DateTime, Utc};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// A single field value. Serializes without a tag, so JSON output shows the
/// bare string/number/array; timestamps render as RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    List(Vec<String>),
    Records(Vec<Record>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            FieldValue::Records(r) => Some(r),
            _ => None,
        }
    }

    /// Short rendering for human-readable output.
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(n) => n.to_string(),
            FieldValue::Float(f) => format!("{f:.2}"),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Timestamp(t) => t.to_rfc3339(),
            FieldValue::List(items) => items.join(", "),
            FieldValue::Records(r) => format!("{} items", r.len()),
        }
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        FieldValue::List(v)
    }
}

impl From<Vec<Record>> for FieldValue {
    fn from(v: Vec<Record>) -> Self {
        FieldValue::Records(v)
    }
}

/// One normalized unit of scraped data.
///
/// `source_id` and `retrieved_at` are fixed at construction. Everything else
/// lives in the open `fields` map, owned by the adapter that built it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    source_id: String,
    retrieved_at: DateTime<Utc>,
    #[serde(flatten)]
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// Create a record stamped with the current time.
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            retrieved_at: Utc::now(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insert.
    pub fn with(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Insert `value` only when present; absent fields are simply omitted.
    pub fn with_opt<V: Into<FieldValue>>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.set(key, v);
        }
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<FieldValue>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn retrieved_at(&self) -> DateTime<Utc> {
        self.retrieved_at
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_text)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub(crate) fn fields_mut(&mut self) -> &mut BTreeMap<String, FieldValue> {
        &mut self.fields
    }

    /// The best available headline: `title`, then `name`, then the id.
    pub fn headline(&self) -> &str {
        self.text("title")
            .or_else(|| self.text("name"))
            .unwrap_or(&self.source_id)
    }
}

/// Everything one adapter contributed to a research run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: String,
    pub records: Vec<Record>,
    /// Nested detail for the top record; only set on the primary source.
    pub detail: Option<Record>,
    /// Set only when the adapter could not complete at all (it panicked).
    /// Ordinary fetch/parse failures still show up as zero records.
    pub failure: Option<String>,
}

impl SourceReport {
    pub fn new(source: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            source: source.into(),
            records,
            detail: None,
            failure: None,
        }
    }

    pub fn failed(source: impl Into<String>, failure: impl Into<String>) -> Self {
        Self {
            failure: Some(failure.into()),
            ..Self::new(source, Vec::new())
        }
    }
}

impl Serialize for SourceReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 2 + usize::from(self.detail.is_some()) + usize::from(self.failure.is_some());
        let mut state = serializer.serialize_struct("SourceReport", len)?;
        state.serialize_field("count", &self.records.len())?;
        state.serialize_field("records", &self.records)?;
        if let Some(detail) = &self.detail {
            state.serialize_field("detail", detail)?;
        }
        if let Some(failure) = &self.failure {
            state.serialize_field("failure", failure)?;
        }
        state.end()
    }
}

/// Best-effort content pulled from an arbitrary page linked in the results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageContent {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub body: String,
    pub retrieved_at: DateTime<Utc>,
}

/// The outcome of one research run.
///
/// Sections keep the adapters' registration order, including in JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchReport {
    pub query: String,
    pub run_at: DateTime<Utc>,
    pub sections: Vec<SourceReport>,
    pub enrichments: Vec<PageContent>,
}

impl ResearchReport {
    pub fn section(&self, source: &str) -> Option<&SourceReport> {
        self.sections.iter().find(|s| s.source == source)
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.source.as_str()).collect()
    }

    pub fn total_records(&self) -> usize {
        self.sections.iter().map(|s| s.records.len()).sum()
    }
}

struct OrderedSections<'a>(&'a [SourceReport]);

impl Serialize for OrderedSections<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for section in self.0 {
            map.serialize_entry(&section.source, section)?;
        }
        map.end()
    }
}

impl Serialize for ResearchReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResearchReport", 4)?;
        state.serialize_field("query", &self.query)?;
        state.serialize_field("run_at", &self.run_at)?;
        state.serialize_field("sources", &OrderedSections(&self.sections))?;
        state.serialize_field("enrichments", &self.enrichments)?;
        state.end()
    }
}

/// Reports of a multi-topic run, in topic order. Serializes as a map from
/// topic to report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopicReports {
    pub reports: Vec<ResearchReport>,
}

impl TopicReports {
    pub fn topic(&self, query: &str) -> Option<&ResearchReport> {
        self.reports.iter().find(|r| r.query == query)
    }

    pub fn topics(&self) -> Vec<&str> {
        self.reports.iter().map(|r| r.query.as_str()).collect()
    }

    pub fn total_records(&self) -> usize {
        self.reports.iter().map(ResearchReport::total_records).sum()
    }
}

impl Serialize for TopicReports {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.reports.len()))?;
        for report in &self.reports {
            map.serialize_entry(&report.query, report)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_flat_with_iso_timestamp() {
        let record = Record::new("42")
            .with("title", "Rust 2024 edition")
            .with("points", 311i64)
            .with("tags", vec!["rust".to_string(), "release".to_string()]);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["source_id"], "42");
        assert_eq!(json["title"], "Rust 2024 edition");
        assert_eq!(json["points"], 311);
        assert_eq!(json["tags"][1], "release");

        let stamp = json["retrieved_at"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn test_with_opt_skips_absent_values() {
        let record = Record::new("x")
            .with_opt("url", None::<String>)
            .with_opt("author", Some("ferris"));
        assert!(record.get("url").is_none());
        assert_eq!(record.text("author"), Some("ferris"));
    }

    #[test]
    fn test_headline_fallbacks() {
        assert_eq!(Record::new("1").with("title", "T").headline(), "T");
        assert_eq!(Record::new("1").with("name", "serde").headline(), "serde");
        assert_eq!(Record::new("only-id").headline(), "only-id");
    }

    #[test]
    fn test_nested_records_serialize_verbatim() {
        let reply = Record::new("c1").with("body", "first!");
        let record = Record::new("p1").with("replies", vec![reply]);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["replies"][0]["source_id"], "c1");
        assert_eq!(json["replies"][0]["body"], "first!");
    }

    #[test]
    fn test_report_keeps_registration_order() {
        let report = ResearchReport {
            query: "rust".to_string(),
            run_at: Utc::now(),
            sections: vec![
                SourceReport::new("zeta", vec![Record::new("1")]),
                SourceReport::new("alpha", vec![]),
                SourceReport::failed("mid", "adapter panicked"),
            ],
            enrichments: vec![],
        };

        let json = serde_json::to_string(&report).unwrap();
        let zeta = json.find("\"zeta\"").unwrap();
        let alpha = json.find("\"alpha\"").unwrap();
        let mid = json.find("\"mid\"").unwrap();
        assert!(zeta < alpha && alpha < mid);
        assert!(json.contains("\"failure\":\"adapter panicked\""));
        assert_eq!(report.source_ids(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(report.total_records(), 1);
    }

    #[test]
    fn test_u64_field_saturates() {
        assert_eq!(FieldValue::from(u64::MAX), FieldValue::Integer(i64::MAX));
    }
}
