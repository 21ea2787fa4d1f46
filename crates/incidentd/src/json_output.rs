//! Parse boundary for structured model output.
//!
//! The model is an untyped text source: replies may be wrapped in markdown
//! fences or surrounded by chatter, so the JSON object is located first and
//! then deserialized strictly.

use serde::de::DeserializeOwned;

/// Extract the JSON object from a model reply (handles markdown code blocks)
pub fn extract_json(response: &str) -> Option<&str> {
    let t = response.trim();
    if t.starts_with('{') && t.ends_with('}') {
        return Some(t);
    }
    if let Some(s) = t.find("```json") {
        let body = &t[s + 7..];
        if let Some(e) = body.find("```") {
            let inner = body[..e].trim();
            if !inner.is_empty() {
                return Some(inner);
            }
        }
    }
    if let Some(s) = t.find("```") {
        let body = &t[s + 3..];
        if let Some(e) = body.find("```") {
            let inner = &body[..e];
            if let Some(open) = inner.find('{') {
                return Some(inner[open..].trim());
            }
        }
    }
    match (t.find('{'), t.rfind('}')) {
        (Some(s), Some(e)) if s < e => Some(&t[s..=e]),
        _ => None,
    }
}

/// Locate and deserialize a JSON object, describing the failure on error
pub fn parse_json<T: DeserializeOwned>(response: &str) -> Result<T, String> {
    let json = extract_json(response).ok_or_else(|| "no JSON object found".to_string())?;
    serde_json::from_str(json).map_err(|e| e.to_string())
}
