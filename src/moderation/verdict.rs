//! The structured moderation verdict.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Structured result produced by the model.
///
/// `is_likely_ai_score` is expected in `[0, 1]` but the model does not
/// guarantee it. Out-of-range values are kept as-is; see
/// [`ModerationVerdict::score_in_range`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub details: String,
    pub category: String,
    #[serde(rename = "isViolence", deserialize_with = "lenient_bool")]
    pub is_violence: bool,
    #[serde(rename = "isPornographic", deserialize_with = "lenient_bool")]
    pub is_pornographic: bool,
    #[serde(rename = "isProfanity", deserialize_with = "lenient_bool")]
    pub is_profanity: bool,
    #[serde(
        rename = "isLikelyAI_Score",
        alias = "isLikelyAIScore",
        deserialize_with = "lenient_score"
    )]
    pub is_likely_ai_score: f64,
    #[serde(rename = "isLikelyAI_Explanation", alias = "isLikelyAIExplanation")]
    pub is_likely_ai_explanation: String,
}

impl ModerationVerdict {
    /// Whether the AI-likelihood score lies in `[0, 1]`.
    pub fn score_in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.is_likely_ai_score)
    }

    /// Whether any of the safety flags is set.
    pub fn is_flagged(&self) -> bool {
        self.is_violence || self.is_pornographic || self.is_profanity
    }
}

#[derive(Debug, Error)]
pub enum VerdictParseError {
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

/// Parse sanitized model text into a verdict.
pub fn parse_verdict(text: &str) -> Result<ModerationVerdict, VerdictParseError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(VerdictParseError::NotAnObject(json_kind(&value)));
    }
    Ok(serde_json::from_value(value)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolRepr {
    Bool(bool),
    Text(String),
}

/// Accept `true`/`false` or their string spellings in any case.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match BoolRepr::deserialize(deserializer)? {
        BoolRepr::Bool(b) => Ok(b),
        BoolRepr::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(serde::de::Error::custom(format!(
                "expected a boolean, found {s:?}"
            ))),
        },
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScoreRepr {
    Number(f64),
    Text(String),
}

/// Accept a number or a numeric string.
fn lenient_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match ScoreRepr::deserialize(deserializer)? {
        ScoreRepr::Number(n) => Ok(n),
        ScoreRepr::Text(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or_else(|| serde::de::Error::custom(format!("expected a number, found {s:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = r#"{
        "details": "A crowd holding signs in a city square.",
        "category": "Protest",
        "isViolence": false,
        "isPornographic": false,
        "isProfanity": true,
        "isLikelyAI_Score": 0.15,
        "isLikelyAI_Explanation": "Natural lighting and consistent detail."
    }"#;

    #[test]
    fn test_parse_well_formed() {
        let verdict = parse_verdict(WELL_FORMED).unwrap();
        assert_eq!(verdict.category, "Protest");
        assert!(!verdict.is_violence);
        assert!(verdict.is_profanity);
        assert_eq!(verdict.is_likely_ai_score, 0.15);
        assert!(verdict.score_in_range());
        assert!(verdict.is_flagged());
    }

    #[test]
    fn test_parse_lenient_values_and_aliases() {
        let verdict = parse_verdict(
            r#"{
                "details": "d", "category": "c",
                "isViolence": "True", "isPornographic": "FALSE", "isProfanity": false,
                "isLikelyAIScore": "0.8",
                "isLikelyAIExplanation": "e",
                "extra": 1
            }"#,
        )
        .unwrap();
        assert!(verdict.is_violence);
        assert!(!verdict.is_pornographic);
        assert_eq!(verdict.is_likely_ai_score, 0.8);
        assert_eq!(verdict.is_likely_ai_explanation, "e");
    }

    #[test]
    fn test_out_of_range_score_is_kept() {
        let text = WELL_FORMED.replace("0.15", "7");
        let verdict = parse_verdict(&text).unwrap();
        assert_eq!(verdict.is_likely_ai_score, 7.0);
        assert!(!verdict.score_in_range());
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(
            parse_verdict("[1, 2]"),
            Err(VerdictParseError::NotAnObject("an array"))
        ));
        assert!(matches!(
            parse_verdict("\"text\""),
            Err(VerdictParseError::NotAnObject("a string"))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let text = WELL_FORMED.replace("\"category\": \"Protest\",", "");
        let err = parse_verdict(&text).unwrap_err();
        assert!(err.to_string().contains("category"), "{err}");
    }

    #[test]
    fn test_parse_rejects_bad_bool_and_score() {
        let text = WELL_FORMED.replace("\"isViolence\": false", "\"isViolence\": \"maybe\"");
        assert!(parse_verdict(&text).is_err());

        let text = WELL_FORMED.replace("0.15", "\"high\"");
        assert!(parse_verdict(&text).is_err());
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(matches!(
            parse_verdict("{\"details\": "),
            Err(VerdictParseError::Json(_))
        ));
    }

    #[test]
    fn test_serializes_canonical_keys() {
        let verdict = parse_verdict(WELL_FORMED).unwrap();
        let value = serde_json::to_value(&verdict).unwrap();
        assert_eq!(value["isLikelyAI_Score"], 0.15);
        assert_eq!(value["isProfanity"], true);
        assert!(value.get("is_profanity").is_none());
    }
}
