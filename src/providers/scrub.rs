use std::borrow::Cow;

const MAX_API_ERROR_CHARS: usize = 200;
const REDACTED: &str = "[REDACTED]";

/// Key prefixes issued by the vendors we talk to.
const PREFIX_PATTERNS: [&str; 8] = [
    "sk-ant-", "sk-or-", "sk-", "gsk_", "xai-", "AIza", "ya29.", "hf_",
];

/// Places a credential shows up in request echoes and error bodies.
const MARKER_PATTERNS: [&str; 10] = [
    "Authorization: Bearer ",
    "authorization: bearer ",
    "\"authorization\":\"Bearer ",
    "x-api-key: ",
    "x-goog-api-key: ",
    "api_key=",
    "key=",
    "access_token=",
    "\"api_key\":\"",
    "\"access_token\":\"",
];

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/' | '=')
}

fn token_end(input: &str, from: usize) -> usize {
    input[from..]
        .char_indices()
        .find(|(_, c)| !is_secret_char(*c))
        .map_or(input.len(), |(i, _)| from + i)
}

fn scrub_after_marker(scrubbed: &mut String, marker: &str) {
    let mut search_from = 0;
    while let Some(rel) = scrubbed[search_from..].find(marker) {
        let start = search_from + rel;
        let content_start = start + marker.len();
        let end = token_end(scrubbed, content_start);

        // Bare marker without a value, or a value we already redacted.
        if end == content_start || scrubbed[content_start..].starts_with(REDACTED) {
            search_from = content_start;
            continue;
        }

        scrubbed.replace_range(start..end, REDACTED);
        search_from = start + REDACTED.len();
    }
}

/// Redact credential-looking tokens from provider error text.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    let needs_scrubbing = PREFIX_PATTERNS
        .iter()
        .chain(MARKER_PATTERNS.iter())
        .any(|pattern| input.contains(pattern));
    if !needs_scrubbing {
        return Cow::Borrowed(input);
    }

    let mut scrubbed = input.to_string();
    for pattern in PREFIX_PATTERNS.iter().chain(MARKER_PATTERNS.iter()) {
        scrub_after_marker(&mut scrubbed, pattern);
    }
    Cow::Owned(scrubbed)
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    let trimmed = scrubbed.trim();

    match trimmed.char_indices().nth(MAX_API_ERROR_CHARS) {
        Some((end, _)) => format!("{}...", &trimmed[..end]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_api_error, scrub_secret_patterns};

    #[test]
    fn leaves_clean_text_borrowed() {
        let input = "model overloaded, try again";
        assert!(matches!(
            scrub_secret_patterns(input),
            std::borrow::Cow::Borrowed(_)
        ));
    }

    #[test]
    fn redacts_openai_and_anthropic_keys() {
        let scrubbed = scrub_secret_patterns("bad key sk-proj-123abc and sk-ant-api03-xyz");
        assert!(!scrubbed.contains("sk-proj-123abc"));
        assert!(!scrubbed.contains("api03-xyz"));
        assert!(scrubbed.contains("[REDACTED]"));
    }

    #[test]
    fn redacts_gemini_query_key() {
        let scrubbed = scrub_secret_patterns(
            "POST https://generativelanguage.googleapis.com/v1beta/models/x?key=abc123 failed",
        );
        assert!(!scrubbed.contains("abc123"));
        assert!(scrubbed.contains("failed"));
    }

    #[test]
    fn redacts_bearer_header_echo() {
        let scrubbed = scrub_secret_patterns("Authorization: Bearer tok_999 rejected");
        assert_eq!(scrubbed, "[REDACTED] rejected");
    }

    #[test]
    fn truncates_long_bodies_on_char_boundary() {
        let body = "é".repeat(500);
        let sanitized = sanitize_api_error(&body);
        assert!(sanitized.ends_with("..."));
        assert_eq!(sanitized.chars().count(), 203);
    }
}
