use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::constants::normalize::UNKNOWN_TAG;
pub use crate::types::{CategoryId, SourceId};

/// Decoded upstream record of unknown shape (one JSON object).
pub type UpstreamRecord = Map<String, Value>;

/// Canonical record emitted by the normalizer and persisted one per line.
///
/// Field order here is the on-disk key order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Prompt of an instruction/response pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    /// Optional context for the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Response of an instruction/response pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Monolithic passage used when there is no instruction/response split.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Category tag, written as `_category`.
    #[serde(rename = "_category")]
    pub category: CategoryId,
    /// Source id, written as `_source`.
    #[serde(rename = "_source")]
    pub source: SourceId,
}

impl CanonicalRecord {
    /// Semantic fields in fingerprint order, with empty strings for missing values.
    pub fn semantic_fields(&self) -> [&str; 4] {
        [
            self.instruction.as_deref().unwrap_or(""),
            self.input.as_deref().unwrap_or(""),
            self.output.as_deref().unwrap_or(""),
            self.text.as_deref().unwrap_or(""),
        ]
    }

    /// Total character length of the semantic fields.
    pub fn semantic_len(&self) -> usize {
        self.semantic_fields()
            .iter()
            .map(|field| field.chars().count())
            .sum()
    }

    /// True when instruction/output or text carries content.
    pub fn has_payload(&self) -> bool {
        let non_empty = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.is_empty());
        non_empty(&self.instruction) || non_empty(&self.output) || non_empty(&self.text)
    }

    /// Re-encode as an upstream record (used to re-normalize persisted corpora).
    pub fn to_upstream(&self) -> UpstreamRecord {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// String tag stored under `field`, or `unknown` when absent or not a string.
pub fn record_tag<'a>(record: &'a UpstreamRecord, field: &str) -> &'a str {
    record
        .get(field)
        .and_then(Value::as_str)
        .filter(|tag| !tag.is_empty())
        .unwrap_or(UNKNOWN_TAG)
}

/// Why the normalizer refused a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Decoded but not mappable to the canonical schema.
    Unshaped,
    /// Mapped but shorter than the configured minimum length.
    Short,
    /// Missing category or source tag.
    Untagged,
}

impl SkipReason {
    /// Stable lowercase label used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::Unshaped => "unshaped",
            SkipReason::Short => "short",
            SkipReason::Untagged => "untagged",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CanonicalRecord {
        CanonicalRecord {
            instruction: Some("Explain".into()),
            input: None,
            output: Some("Because.".into()),
            text: None,
            category: "chat".into(),
            source: "alpaca".into(),
        }
    }

    #[test]
    fn serializes_meta_tags_with_underscore_keys_and_skips_missing_fields() {
        let line = serde_json::to_string(&record()).unwrap();
        assert_eq!(
            line,
            r#"{"instruction":"Explain","output":"Because.","_category":"chat","_source":"alpaca"}"#
        );
        let decoded: CanonicalRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded, record());
    }

    #[test]
    fn semantic_len_counts_characters_not_bytes() {
        let mut rec = record();
        rec.instruction = Some("é".into());
        rec.output = Some("ü".into());
        assert_eq!(rec.semantic_len(), 2);
        assert!(rec.has_payload());
    }

    #[test]
    fn record_tag_falls_back_to_unknown() {
        let upstream = record().to_upstream();
        assert_eq!(record_tag(&upstream, "_category"), "chat");
        assert_eq!(record_tag(&upstream, "missing"), "unknown");
        let mut numeric = UpstreamRecord::new();
        numeric.insert("_source".into(), Value::from(7));
        assert_eq!(record_tag(&numeric, "_source"), "unknown");
    }

    #[test]
    fn to_upstream_keeps_every_present_key() {
        let upstream = record().to_upstream();
        let keys: Vec<&str> = upstream.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["instruction", "output", "_category", "_source"]);
    }
}
