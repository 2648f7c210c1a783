use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Structured answer. Field order is the serialized key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub solution_proposals: Vec<String>,
    pub similar_cases: Vec<String>,
    pub cost_estimate: Vec<String>,
}

/// Every field is required; a missing key or a non-list value is a parse failure
/// rather than an empty default.
///
/// JSON is parsed strictly: a raw tab or newline inside a string literal is
/// rejected, so the model has to escape control characters as `\t` / `\n`.
pub fn parse_solution(content: &str) -> AppResult<Solution> {
    let json_str = extract_json(content);

    serde_json::from_str::<Solution>(&json_str).map_err(|e| {
        AppError::Parse(format!(
            "model output does not match the expected schema ({e}): {}",
            preview(content, 200)
        ))
    })
}

pub(crate) fn extract_json(content: &str) -> String {
    if let Some(start) = content.find("```json")
        && let Some(end) = content[start + 7..].find("```")
    {
        return content[start + 7..start + 7 + end].trim().to_string();
    }
    if let Some(start) = content.find("```")
        && let Some(end) = content[start + 3..].find("```")
    {
        let inner = content[start + 3..start + 3 + end].trim();
        if inner.starts_with('{') {
            return inner.to_string();
        }
    }
    if let Some(start) = content.find('{')
        && let Some(end) = content.rfind('}')
        && start < end
    {
        return content[start..=end].to_string();
    }
    content.to_string()
}

fn preview(s: &str, max_chars: usize) -> String {
    let mut out: String = s.trim().chars().take(max_chars).collect();
    if s.trim().chars().count() > max_chars {
        out.push('…');
    }
    out
}
