//! Tolerant parsing of judge output.
//!
//! Judges are asked for strict JSON but routinely wrap it in prose or code
//! fences, answer booleans as strings, or score on a 0-10 scale.

use serde_json::Value;

use crate::error::ScorerError;
use crate::types::clamp_score;

/// A parsed judge answer, score already normalised to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    pub score: f64,
    pub reason: Option<String>,
}

/// Extract a JSON object from judge text: the whole text when it parses,
/// otherwise the span between the first `{` and the last `}`.
pub fn extract_json(text: &str) -> Option<serde_json::Map<String, Value>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return Some(map);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Coerce a JSON value to a boolean. Accepts real booleans and the strings
/// `true/yes/y/1` and `false/no/n/0` in any case.
pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Normalise a raw score into `[0, 1]`. Values above 1 are read as a 0-10 scale.
pub fn normalize_score(raw: f64) -> f64 {
    if raw > 1.0 {
        clamp_score(raw / 10.0)
    } else {
        clamp_score(raw)
    }
}

fn as_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Metric-specific keys accepted on top of the generic ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerdictKeys {
    /// Boolean verdict keys, tried after `success`, `verdict` and `passed`.
    pub verdict: &'static [&'static str],
    /// Rationale keys, tried after `reason`, `rationale` and `explanation`.
    pub reason: &'static [&'static str],
}

impl VerdictKeys {
    pub const GENERIC: VerdictKeys = VerdictKeys {
        verdict: &[],
        reason: &[],
    };
}

/// Parse a judge answer into a verdict.
///
/// A numeric `score` wins. Otherwise the first boolean among `success`,
/// `verdict`, `passed` and `keys.verdict` maps to 1.0 or 0.0.
pub fn parse_verdict(text: &str, keys: &VerdictKeys) -> Result<JudgeVerdict, ScorerError> {
    let map = extract_json(text).ok_or_else(|| ScorerError::MalformedResponse {
        message: format!("no JSON object in judge output: {}", preview(text)),
    })?;

    let reason = ["reason", "rationale", "explanation"]
        .iter()
        .chain(keys.reason.iter())
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if let Some(raw) = map.get("score").and_then(as_score) {
        if raw.is_nan() || raw < 0.0 {
            return Err(ScorerError::MalformedResponse {
                message: format!("judge score {raw} is not a valid score"),
            });
        }
        return Ok(JudgeVerdict {
            score: normalize_score(raw),
            reason,
        });
    }

    let verdict = ["success", "verdict", "passed"]
        .iter()
        .chain(keys.verdict.iter())
        .find_map(|k| map.get(*k).and_then(as_bool));
    match verdict {
        Some(ok) => Ok(JudgeVerdict {
            score: if ok { 1.0 } else { 0.0 },
            reason,
        }),
        None => Err(ScorerError::MalformedResponse {
            message: format!("judge output has no score or verdict: {}", preview(text)),
        }),
    }
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > 120 {
        let cut: String = trimmed.chars().take(120).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_json_plain() {
        let map = extract_json(r#"{"score": 0.8}"#).unwrap();
        assert_eq!(map["score"], json!(0.8));
    }

    #[test]
    fn test_extract_json_wrapped_in_prose_and_fences() {
        let text = "Sure! Here you go:\n```json\n{\"success\": true, \"reason\": \"ok\"}\n```";
        let map = extract_json(text).unwrap();
        assert_eq!(map["success"], json!(true));
    }

    #[test]
    fn test_extract_json_rejects_garbage() {
        assert!(extract_json("").is_none());
        assert!(extract_json("no braces here").is_none());
        assert!(extract_json("} backwards {").is_none());
        assert!(extract_json("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_as_bool_variants() {
        assert_eq!(as_bool(&json!(true)), Some(true));
        assert_eq!(as_bool(&json!("Yes")), Some(true));
        assert_eq!(as_bool(&json!(" y ")), Some(true));
        assert_eq!(as_bool(&json!("0")), Some(false));
        assert_eq!(as_bool(&json!("NO")), Some(false));
        assert_eq!(as_bool(&json!(1)), Some(true));
        assert_eq!(as_bool(&json!("maybe")), None);
        assert_eq!(as_bool(&json!(null)), None);
    }

    #[test]
    fn test_normalize_score_ten_point_scale() {
        assert_eq!(normalize_score(0.6), 0.6);
        assert_eq!(normalize_score(7.0), 0.7);
        assert_eq!(normalize_score(10.0), 1.0);
        assert_eq!(normalize_score(42.0), 1.0);
        assert_eq!(normalize_score(-1.0), 0.0);
    }

    #[test]
    fn test_parse_verdict_score_and_reason() {
        let v = parse_verdict(r#"{"score": "8", "reason": " close match "}"#, &VerdictKeys::GENERIC).unwrap();
        assert_eq!(v.score, 0.8);
        assert_eq!(v.reason.as_deref(), Some("close match"));
    }

    #[test]
    fn test_parse_verdict_boolean_fallback() {
        let v = parse_verdict(
            r#"{"hallucination_success": "true", "hallucination_reason": "grounded"}"#,
            &VerdictKeys {
                verdict: &["hallucination_success"],
                reason: &["hallucination_reason"],
            },
        )
        .unwrap();
        assert_eq!(v.score, 1.0);
        assert_eq!(v.reason.as_deref(), Some("grounded"));

        let v = parse_verdict(r#"{"verdict": "no"}"#, &VerdictKeys::GENERIC).unwrap();
        assert_eq!(v.score, 0.0);
    }

    #[test]
    fn test_parse_verdict_malformed() {
        let err = parse_verdict("I think it is fine", &VerdictKeys::GENERIC).unwrap_err();
        assert!(matches!(err, ScorerError::MalformedResponse { .. }));

        let err = parse_verdict(r#"{"reason": "no verdict"}"#, &VerdictKeys::GENERIC).unwrap_err();
        assert!(err.to_string().contains("no score or verdict"));

        assert!(parse_verdict(r#"{"score": -3}"#, &VerdictKeys::GENERIC).is_err());
    }

    #[test]
    fn test_generic_reason_preferred_over_metric_reason() {
        let keys = VerdictKeys {
            verdict: &["traceability_geval_success"],
            reason: &["traceability_geval_reason"],
        };
        let v = parse_verdict(
            r#"{"traceability_geval_success": false, "traceability_geval_reason": "unsupported claim"}"#,
            &keys,
        )
        .unwrap();
        assert_eq!(v.score, 0.0);
        assert_eq!(v.reason.as_deref(), Some("unsupported claim"));

        let v = parse_verdict(
            r#"{"score": 0.4, "reason": "generic", "traceability_geval_reason": "specific"}"#,
            &keys,
        )
        .unwrap();
        assert_eq!(v.reason.as_deref(), Some("generic"));
    }
}
