use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use super::AnalysisError;
use crate::models::enums::RiskLevel;

/// The LLM's refinement, parsed leniently: every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AiAssessment {
    #[serde(default, alias = "provisional_diagnosis")]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub icd_code: Option<String>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default, alias = "risk")]
    risk_level: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default, deserialize_with = "lenient_strings")]
    pub recommendations: Vec<String>,
}

impl AiAssessment {
    /// Confidence as 0–100. Values in 0–1 are read as fractions; strings
    /// such as `"85%"` are accepted.
    pub fn confidence_percent(&self) -> Option<u8> {
        let raw = match self.confidence.as_ref()? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok()?,
            _ => return None,
        };
        if !raw.is_finite() {
            return None;
        }
        let percent = if raw > 0.0 && raw <= 1.0 && raw.fract() != 0.0 {
            raw * 100.0
        } else {
            raw
        };
        Some(percent.round().clamp(0.0, 100.0) as u8)
    }

    pub fn risk(&self) -> Option<RiskLevel> {
        let raw = self.risk_level.as_deref()?.trim().to_ascii_lowercase();
        let normalized = match raw.as_str() {
            "medium" => "moderate",
            "urgent" | "emergency" => "critical",
            other => other,
        };
        RiskLevel::from_str(normalized).ok()
    }
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => vec![],
    })
}

/// Parse the model's reply: a fenced ```json block, any fenced block, or
/// the outermost `{...}` span.
pub fn parse_ai_reply(response: &str) -> Result<AiAssessment, AnalysisError> {
    let json_str = extract_json(response)
        .ok_or_else(|| AnalysisError::MalformedResponse("No JSON object found".into()))?;
    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;
    if !value.is_object() {
        return Err(AnalysisError::MalformedResponse("Expected a JSON object".into()));
    }
    serde_json::from_value(value).map_err(|e| AnalysisError::MalformedResponse(e.to_string()))
}

fn extract_json(response: &str) -> Option<&str> {
    if let Some(start) = response.find("```json") {
        let content = &response[start + 7..];
        let end = content.find("```")?;
        return Some(content[..end].trim());
    }
    if let Some(start) = response.find("```") {
        let content = &response[start + 3..];
        if let Some(end) = content.find("```") {
            let block = content[..end].trim();
            if block.starts_with('{') {
                return Some(block);
            }
        }
    }
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}
