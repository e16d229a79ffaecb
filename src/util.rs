/// Truncate to `max` characters, appending `...` when anything was cut (Unicode-safe).
pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

/// Maximum length for upstream error content echoed back to the user
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// Sanitize upstream error text before it lands in the transcript.
/// Truncates long bodies and redacts anything that looks like a credential.
pub fn sanitize_error_text(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "aiza", // Google API key prefix
        "ghp_",
        "github_pat_",
    ];

    let truncated = truncate(content, MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(error details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated
}
