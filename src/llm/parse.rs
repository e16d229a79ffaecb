//! Splitting a raw completion into its visible answer and reasoning trace.

pub const THINKING_OPEN: &str = "<thinking>";
pub const THINKING_CLOSE: &str = "</thinking>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub visible: String,
    pub trace: Option<String>,
}

/// Extract the first `<thinking>...</thinking>` block.
///
/// Only one block is recognized: the first opening tag through the first
/// closing tag after it. Without a complete block the input is returned as
/// the visible text untouched.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let Some(open) = raw.find(THINKING_OPEN) else {
        return unparsed(raw);
    };
    let body_start = open + THINKING_OPEN.len();
    let Some(close_rel) = raw[body_start..].find(THINKING_CLOSE) else {
        return unparsed(raw);
    };
    let body_end = body_start + close_rel;
    let after = body_end + THINKING_CLOSE.len();

    let visible = format!("{}{}", &raw[..open], &raw[after..]);
    ParsedResponse {
        visible: visible.trim().to_string(),
        trace: Some(raw[body_start..body_end].trim().to_string()),
    }
}

fn unparsed(raw: &str) -> ParsedResponse {
    ParsedResponse {
        visible: raw.to_string(),
        trace: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_is_extracted_and_removed() {
        let parsed = parse_response("intro <thinking>reasoned here</thinking> conclusion");
        assert_eq!(parsed.visible, "intro  conclusion");
        assert_eq!(parsed.trace.as_deref(), Some("reasoned here"));
    }

    #[test]
    fn test_no_tags_leaves_input_unchanged() {
        let raw = "  just an answer\n";
        let parsed = parse_response(raw);
        assert_eq!(parsed.visible, raw);
        assert_eq!(parsed.trace, None);
    }

    #[test]
    fn test_only_first_block_is_extracted() {
        let parsed = parse_response("<thinking>one</thinking>A<thinking>two</thinking>B");
        assert_eq!(parsed.trace.as_deref(), Some("one"));
        assert_eq!(parsed.visible, "A<thinking>two</thinking>B");
    }

    #[test]
    fn test_unclosed_tag_is_not_a_trace() {
        let raw = "<thinking>never closed";
        let parsed = parse_response(raw);
        assert_eq!(parsed.visible, raw);
        assert!(parsed.trace.is_none());
    }

    #[test]
    fn test_trace_whitespace_is_trimmed() {
        let parsed = parse_response("<thinking>\n  step 1\n  step 2\n</thinking>\n\nFinal.");
        assert_eq!(parsed.trace.as_deref(), Some("step 1\n  step 2"));
        assert_eq!(parsed.visible, "Final.");
    }
}
