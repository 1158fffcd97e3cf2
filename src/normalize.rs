//! Upstream shape detection and mapping to the canonical record schema.
//!
//! Shapes are tried in table order and the first detector that matches owns
//! the record: its emitter either maps it or rejects it as unshaped. Adding a
//! shape means adding one [`ShapeRule`] row.

use serde_json::Value;

use crate::config::NormalizerConfig;
use crate::constants::normalize::{FALLBACK_FIELD_MIN_LEN, META_FIELD_PREFIX};
use crate::data::{CanonicalRecord, SkipReason, UpstreamRecord};

/// Semantic payload produced by a shape emitter, before tagging.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappedFields {
    /// Prompt text.
    pub instruction: Option<String>,
    /// Optional prompt context.
    pub input: Option<String>,
    /// Response text.
    pub output: Option<String>,
    /// Monolithic passage.
    pub text: Option<String>,
}

impl MappedFields {
    fn pair(instruction: String, output: String) -> Self {
        Self {
            instruction: Some(instruction),
            output: Some(output),
            ..Self::default()
        }
    }

    fn passage(text: String) -> Self {
        Self {
            text: Some(text),
            ..Self::default()
        }
    }
}

/// One row of the shape table.
#[derive(Clone, Copy)]
pub struct ShapeRule {
    /// Short label used in debug logs.
    pub name: &'static str,
    /// True when the record has this shape.
    pub detect: fn(&UpstreamRecord) -> bool,
    /// Map a detected record; `None` rejects it as unshaped.
    pub emit: fn(&UpstreamRecord) -> Option<MappedFields>,
}

/// Ordered shape table; first matching detector wins.
pub static SHAPE_RULES: &[ShapeRule] = &[
    ShapeRule {
        name: "instruction_output",
        detect: |r| has_all(r, &["instruction", "output"]),
        emit: emit_instruction_output,
    },
    ShapeRule {
        name: "input_output",
        detect: |r| has_all(r, &["input", "output"]),
        emit: |r| emit_pair(r, "input", "output"),
    },
    ShapeRule {
        name: "question_answer",
        detect: |r| has_all(r, &["question", "answer"]),
        emit: |r| emit_pair(r, "question", "answer"),
    },
    ShapeRule {
        name: "prompt_response",
        detect: |r| has_all(r, &["prompt", "response"]),
        emit: |r| emit_pair(r, "prompt", "response"),
    },
    ShapeRule {
        name: "prompt_completion",
        detect: |r| has_all(r, &["prompt", "completion"]),
        emit: |r| emit_pair(r, "prompt", "completion"),
    },
    ShapeRule {
        name: "conversations",
        detect: |r| r.get("conversations").is_some_and(Value::is_array),
        emit: |r| emit_turns(r, "conversations", "value"),
    },
    ShapeRule {
        name: "messages",
        detect: |r| r.get("messages").is_some_and(Value::is_array),
        emit: |r| emit_turns(r, "messages", "content"),
    },
    ShapeRule {
        name: "preference_pair",
        detect: |r| has_all(r, &["chosen", "rejected"]),
        emit: emit_preference_pair,
    },
    ShapeRule {
        name: "text",
        detect: |r| has_all(r, &["text"]),
        emit: |r| field_text(r, "text").map(MappedFields::passage),
    },
    ShapeRule {
        name: "content",
        detect: |r| has_all(r, &["content"]),
        emit: |r| field_text(r, "content").map(MappedFields::passage),
    },
    ShapeRule {
        name: "long_string_scan",
        detect: |_| true,
        emit: emit_long_strings,
    },
];

/// Maps upstream records of any known shape to canonical records.
#[derive(Clone, Debug, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    /// Create a normalizer with explicit configuration.
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Map `upstream` to a canonical record tagged with `category_hint` and `source_id`.
    pub fn normalize(
        &self,
        upstream: &UpstreamRecord,
        category_hint: &str,
        source_id: &str,
    ) -> Result<CanonicalRecord, SkipReason> {
        if category_hint.is_empty() || source_id.is_empty() {
            return Err(SkipReason::Untagged);
        }
        let rule = SHAPE_RULES
            .iter()
            .find(|rule| (rule.detect)(upstream))
            .ok_or(SkipReason::Unshaped)?;
        let mapped = (rule.emit)(upstream).ok_or(SkipReason::Unshaped)?;
        let record = CanonicalRecord {
            instruction: mapped.instruction,
            input: mapped.input,
            output: mapped.output,
            text: mapped.text,
            category: category_hint.to_string(),
            source: source_id.to_string(),
        };
        if !record.has_payload() {
            return Err(SkipReason::Unshaped);
        }
        if record.semantic_len() < self.config.min_len {
            return Err(SkipReason::Short);
        }
        Ok(record)
    }

    /// Name of the shape rule that would handle `upstream`.
    pub fn detect_shape(upstream: &UpstreamRecord) -> Option<&'static str> {
        SHAPE_RULES
            .iter()
            .find(|rule| (rule.detect)(upstream))
            .map(|rule| rule.name)
    }
}

/// Coerce a JSON value to text; `null` has no text form.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn is_present(record: &UpstreamRecord, key: &str) -> bool {
    record.get(key).is_some_and(|value| !value.is_null())
}

fn has_all(record: &UpstreamRecord, keys: &[&str]) -> bool {
    keys.iter().all(|key| is_present(record, key))
}

fn field_text(record: &UpstreamRecord, key: &str) -> Option<String> {
    record.get(key).and_then(value_to_text)
}

fn emit_pair(record: &UpstreamRecord, instruction: &str, output: &str) -> Option<MappedFields> {
    Some(MappedFields::pair(
        field_text(record, instruction)?,
        field_text(record, output)?,
    ))
}

fn emit_instruction_output(record: &UpstreamRecord) -> Option<MappedFields> {
    let mut mapped = emit_pair(record, "instruction", "output")?;
    mapped.input = field_text(record, "input");
    Some(mapped)
}

fn emit_turns(record: &UpstreamRecord, list_key: &str, text_key: &str) -> Option<MappedFields> {
    let turns = record.get(list_key)?.as_array()?;
    if turns.len() < 2 {
        return None;
    }
    let turn_text = |turn: &Value| turn.as_object()?.get(text_key).and_then(value_to_text);
    Some(MappedFields::pair(
        turn_text(&turns[0])?,
        turn_text(&turns[1])?,
    ))
}

fn emit_preference_pair(record: &UpstreamRecord) -> Option<MappedFields> {
    let output = field_text(record, "chosen")?;
    let instruction = field_text(record, "prompt")
        .or_else(|| field_text(record, "question"))
        .unwrap_or_default();
    Some(MappedFields::pair(instruction, output))
}

fn emit_long_strings(record: &UpstreamRecord) -> Option<MappedFields> {
    let parts: Vec<&str> = record
        .iter()
        .filter(|(key, _)| !key.starts_with(META_FIELD_PREFIX))
        .filter_map(|(_, value)| value.as_str())
        .filter(|text| text.chars().count() > FALLBACK_FIELD_MIN_LEN)
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(MappedFields::passage(parts.join(" ")))
}
