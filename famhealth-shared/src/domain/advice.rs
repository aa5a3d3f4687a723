//! Structured health advice and the parser for model output
//!
//! The language model is asked for a JSON object; replies may wrap it in a
//! markdown fence or surround it with prose. [`parse_advice_json`] recovers the
//! object, checks the two required fields and normalizes the rest.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Reads a text field the model may have left null or filled with a number
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Severity-tagged finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concern {
    #[serde(default, deserialize_with = "lenient_text")]
    pub level: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default, deserialize_with = "lenient_text")]
    pub category: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    #[serde(default, deserialize_with = "lenient_text")]
    pub text: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub priority: String,
}

/// Advice body as stored in `health_advice.content`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceContent {
    pub health_score: i32,
    pub summary: String,
    #[serde(default)]
    pub concerns: Vec<Concern>,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
}

/// Why model output could not be turned into advice
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AdviceParseError {
    #[error("no JSON object found in model output")]
    NoJson,

    #[error("model output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("model output is missing field `{0}`")]
    MissingField(&'static str),
}

/// Slices the JSON payload out of a model reply
fn extract_json(content: &str) -> Option<&str> {
    if let Some(start) = content.find("```json") {
        let body = &content[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Keeps every list element that reads as `T`; one bad element never drops its siblings
fn array_or_empty<T: serde::de::DeserializeOwned>(value: Option<&Value>) -> Vec<T> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(|item| T::deserialize(item).ok()).collect(),
        _ => Vec::new(),
    }
}

/// Parses a model reply into [`AdviceContent`]
///
/// `healthScore` must be numeric and is clamped to `0..=100`; `summary` must
/// be a string; list fields that are missing or not arrays become empty, and
/// list elements that are not objects are skipped.
pub fn parse_advice_json(content: &str) -> Result<AdviceContent, AdviceParseError> {
    let json = extract_json(content).ok_or(AdviceParseError::NoJson)?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| AdviceParseError::InvalidJson(e.to_string()))?;

    let score = value
        .get("healthScore")
        .and_then(|v| v.as_f64())
        .ok_or(AdviceParseError::MissingField("healthScore"))?;
    let summary = value
        .get("summary")
        .and_then(|v| v.as_str())
        .ok_or(AdviceParseError::MissingField("summary"))?;

    Ok(AdviceContent {
        health_score: score.clamp(0.0, 100.0).round() as i32,
        summary: summary.to_string(),
        concerns: array_or_empty(value.get("concerns")),
        suggestions: array_or_empty(value.get("suggestions")),
        action_items: array_or_empty(value.get("actionItems")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_json() {
        let reply = "好的，报告如下：\n```json\n{\"healthScore\": 82, \"summary\": \"良好\", \"concerns\": [{\"level\": \"warning\", \"title\": \"血压\", \"description\": \"偏高\"}]}\n```\n祝健康";
        let advice = parse_advice_json(reply).unwrap();

        assert_eq!(advice.health_score, 82);
        assert_eq!(advice.summary, "良好");
        assert_eq!(advice.concerns.len(), 1);
        assert_eq!(advice.concerns[0].level, "warning");
        assert!(advice.suggestions.is_empty());
        assert!(advice.action_items.is_empty());
    }

    #[test]
    fn test_parse_bare_object_with_prose() {
        let reply = r#"Result: {"healthScore": 70, "summary": "ok", "actionItems": [{"text": "walk", "priority": "high"}]} thanks"#;
        let advice = parse_advice_json(reply).unwrap();

        assert_eq!(advice.action_items[0].text, "walk");
    }

    #[test]
    fn test_score_is_clamped() {
        let high = parse_advice_json(r#"{"healthScore": 140, "summary": "s"}"#).unwrap();
        assert_eq!(high.health_score, 100);

        let low = parse_advice_json(r#"{"healthScore": -5, "summary": "s"}"#).unwrap();
        assert_eq!(low.health_score, 0);
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert_eq!(
            parse_advice_json(r#"{"summary": "s"}"#),
            Err(AdviceParseError::MissingField("healthScore"))
        );
        assert_eq!(
            parse_advice_json(r#"{"healthScore": "80", "summary": "s"}"#),
            Err(AdviceParseError::MissingField("healthScore"))
        );
        assert_eq!(
            parse_advice_json(r#"{"healthScore": 80}"#),
            Err(AdviceParseError::MissingField("summary"))
        );
    }

    #[test]
    fn test_non_array_lists_become_empty() {
        let advice = parse_advice_json(r#"{"healthScore": 60, "summary": "s", "concerns": "none"}"#).unwrap();
        assert!(advice.concerns.is_empty());
    }

    #[test]
    fn test_null_field_keeps_whole_list() {
        let reply = r#"{"healthScore": 75, "summary": "s", "concerns": [
            {"level": "warning", "title": "血压", "description": "偏高"},
            {"level": null, "title": "血脂", "description": 3.2}
        ]}"#;
        let advice = parse_advice_json(reply).unwrap();

        assert_eq!(advice.concerns.len(), 2);
        assert_eq!(advice.concerns[0].level, "warning");
        assert_eq!(advice.concerns[1].level, "");
        assert_eq!(advice.concerns[1].title, "血脂");
        assert_eq!(advice.concerns[1].description, "3.2");
    }

    #[test]
    fn test_non_object_element_is_skipped() {
        let reply = r#"{"healthScore": 75, "summary": "s", "actionItems": ["walk more", {"text": "sleep", "priority": "low"}]}"#;
        let advice = parse_advice_json(reply).unwrap();

        assert_eq!(advice.action_items.len(), 1);
        assert_eq!(advice.action_items[0].text, "sleep");
    }

    #[test]
    fn test_garbage_rejected() {
        assert_eq!(parse_advice_json("no json here"), Err(AdviceParseError::NoJson));
        assert!(matches!(
            parse_advice_json("{not json}"),
            Err(AdviceParseError::InvalidJson(_))
        ));
    }
}
