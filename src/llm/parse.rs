//! Extracting structured data from model output.
//!
//! Even in JSON mode, responses arrive wrapped in markdown fences, with
//! smart quotes, trailing commas, or stray prose around the object. The
//! helpers here peel that away before serde sees the text. A response
//! that still will not parse is a malformed-response failure - the caller
//! retries the whole call rather than guessing at field defaults.

use crate::resilient::ServiceError;
use serde::de::DeserializeOwned;

/// Strip markdown code fences from a response.
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    clean.strip_suffix("```").unwrap_or(clean).trim()
}

/// Extract the outermost `{...}` fragment, tolerating prose on either side.
fn extract_json_object(text: &str) -> Option<&str> {
    let clean = strip_markdown_fences(text);
    let start = clean.find('{')?;
    let end = clean.rfind('}')?;
    (start <= end).then(|| &clean[start..=end])
}

/// Repair the JSON damage models most often inflict.
fn fix_json_issues(json: &str) -> String {
    let mut fixed = json.to_string();

    // Trailing commas before a closing bracket
    fixed = fixed.replace(",]", "]");
    fixed = fixed.replace(",}", "}");

    // Smart quotes
    fixed = fixed.replace('\u{201C}', "\"");
    fixed = fixed.replace('\u{201D}', "\"");
    fixed = fixed.replace('\u{2018}', "'");
    fixed = fixed.replace('\u{2019}', "'");

    // Control characters that slipped through
    fixed
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Parse a typed structure out of raw model output.
///
/// Tries the extracted object as-is, then once more after mechanical
/// repairs. Anything else is classified as malformed so the resilient
/// caller can retry with a fresh generation.
pub fn parse_response<T: DeserializeOwned>(
    response: &str,
    context_hint: &str,
) -> Result<T, ServiceError> {
    let json_str = extract_json_object(response).ok_or_else(|| {
        ServiceError::Malformed(format!("No JSON object found in {} response", context_hint))
    })?;

    match serde_json::from_str::<T>(json_str) {
        Ok(parsed) => Ok(parsed),
        Err(initial_error) => {
            let fixed = fix_json_issues(json_str);
            serde_json::from_str::<T>(&fixed).map_err(|_| {
                ServiceError::Malformed(format!(
                    "Invalid {} response: {}",
                    context_hint, initial_error
                ))
            })
        }
    }
}

/// Truncate file contents for prompt safety (keep beginning and end).
pub fn truncate_for_prompt(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let head: String = content.chars().take(max_chars / 2).collect();
    let tail: String = {
        let reversed: String = content.chars().rev().take(max_chars / 2).collect();
        reversed.chars().rev().collect()
    };
    format!("{}\n\n... [truncated] ...\n\n{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_parses_fenced_json() {
        let response = "```json\n{\"name\":\"x\",\"count\":3}\n```";
        let parsed: Sample = parse_response(response, "test").unwrap();
        assert_eq!(parsed.name, "x");
        assert_eq!(parsed.count, 3);
    }

    #[test]
    fn test_parses_json_with_surrounding_prose() {
        let response = "Here is the result:\n{\"name\":\"y\",\"count\":1}\nHope that helps!";
        let parsed: Sample = parse_response(response, "test").unwrap();
        assert_eq!(parsed.name, "y");
    }

    #[test]
    fn test_repairs_trailing_comma_and_smart_quotes() {
        let response = "{\u{201C}name\u{201D}:\u{201C}z\u{201D},\"count\":2,}";
        let parsed: Sample = parse_response(response, "test").unwrap();
        assert_eq!(parsed.name, "z");
    }

    #[test]
    fn test_missing_object_is_malformed() {
        let err = parse_response::<Sample>("no json here", "test").unwrap_err();
        assert!(matches!(err, ServiceError::Malformed(_)));
    }

    #[test]
    fn test_unrecoverable_json_is_malformed() {
        let err = parse_response::<Sample>("{\"name\": }", "test").unwrap_err();
        assert!(matches!(err, ServiceError::Malformed(_)));
    }

    #[test]
    fn test_truncate_for_prompt_keeps_both_ends() {
        let content = "start_marker ".to_string() + &"x".repeat(500) + " end_marker";
        let out = truncate_for_prompt(&content, 60);
        assert!(out.contains("start_marker"));
        assert!(out.contains("end_marker"));
        assert!(out.contains("[truncated]"));
    }
}
