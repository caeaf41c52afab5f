//! JSON extraction from conversational agent output.

/// Extract a JSON object from agent output (handles markdown wrapping).
///
/// The to-JSON agents are instructed to emit bare JSON, but models still
/// wrap objects in code fences or prose. Extraction is best-effort; the
/// caller's serde parse decides whether the result is acceptable.
pub fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in a ```json code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    // Wrapped in a bare code block
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Object embedded in surrounding prose
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_object_passes_through() {
        let input = r#"{"questions": []}"#;
        assert_eq!(extract_json_object(input), input);
    }

    #[test]
    fn strips_json_fence() {
        let input = "```json\n{\"questions\": [\"a\"]}\n```";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
        assert!(result.contains("questions"));
    }

    #[test]
    fn strips_bare_fence() {
        let input = "```\n{\"answered_questions\": []}\n```";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
    }

    #[test]
    fn finds_embedded_object() {
        let input = "Here is the result: {\"questions\": [\"x\"]} as requested.";
        let result = extract_json_object(input);
        assert!(result.starts_with('{'));
        assert!(result.ends_with('}'));
    }

    #[test]
    fn plain_text_returned_unchanged() {
        assert_eq!(extract_json_object("no json here"), "no json here");
    }
}
