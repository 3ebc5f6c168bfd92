//! Input Sanitization
//!
//! Free-text sanitization for values that end up in a browser page or a
//! downstream query, plus URL normalization helpers shared by the phishing
//! and RPC checks.

use crate::error::{GuardError, GuardResult};
use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Maximum length for various input types
pub mod limits {
    /// Maximum URL length
    pub const MAX_URL_LENGTH: usize = 2048;
    /// Maximum free-text input accepted by `sanitize_input`
    pub const MAX_INPUT_LENGTH: usize = 64 * 1024;
}

lazy_static! {
    static ref SCRIPT_BLOCK: Regex =
        Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid script pattern");
    static ref SCRIPT_TAG: Regex =
        Regex::new(r"(?i)</?script\b[^>]*>?").expect("valid script tag pattern");
    static ref EVENT_HANDLER: Regex =
        Regex::new(r#"(?i)\s*\bon\w+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#)
            .expect("valid handler pattern");
    static ref SQL_KEYWORDS: Regex = {
        let alternatives: Vec<String> = SQL_INJECTION_KEYWORDS.iter().map(|k| regex::escape(k)).collect();
        Regex::new(&format!("(?i){}", alternatives.join("|"))).expect("valid keyword pattern")
    };
}

/// Substrings removed from sanitized text
pub const SQL_INJECTION_KEYWORDS: &[&str] = &[
    "DROP TABLE",
    "SELECT *",
    "INSERT INTO",
    "DELETE FROM",
    "UPDATE ",
    ";--",
];

/// Sanitization result
#[derive(Debug, Clone)]
pub struct SanitizeResult<T> {
    pub value: T,
    pub was_modified: bool,
    pub modifications: Vec<String>,
}

impl<T> SanitizeResult<T> {
    pub fn unchanged(value: T) -> Self {
        Self {
            value,
            was_modified: false,
            modifications: Vec::new(),
        }
    }

    pub fn modified(value: T, modifications: Vec<String>) -> Self {
        Self {
            value,
            was_modified: true,
            modifications,
        }
    }
}

/// Sanitize free text.
///
/// Steps run in this order:
/// 1. remove `<script>` blocks and stray script tags from the raw input
/// 2. remove inline `on*=` event-handler attributes
/// 3. HTML-escape `& < > " '`
/// 4. remove SQL injection keywords (case-insensitive)
///
/// Stripping before escaping means the script patterns see real markup.
pub fn sanitize_input(input: &str) -> SanitizeResult<String> {
    let mut result = input.to_string();
    let mut modifications = Vec::new();

    if result.len() > limits::MAX_INPUT_LENGTH {
        result = result.chars().take(limits::MAX_INPUT_LENGTH).collect();
        modifications.push(format!("Truncated to {} characters", limits::MAX_INPUT_LENGTH));
    }

    let stripped = SCRIPT_TAG.replace_all(&SCRIPT_BLOCK.replace_all(&result, ""), "").into_owned();
    if stripped != result {
        modifications.push("Removed script blocks".to_string());
        result = stripped;
    }

    let stripped = EVENT_HANDLER.replace_all(&result, "").into_owned();
    if stripped != result {
        modifications.push("Removed event handlers".to_string());
        result = stripped;
    }

    let escaped = escape_html(&result);
    if escaped != result {
        modifications.push("Escaped HTML".to_string());
        result = escaped;
    }

    let stripped = SQL_KEYWORDS.replace_all(&result, "").into_owned();
    if stripped != result {
        modifications.push("Removed SQL keywords".to_string());
        result = stripped;
    }

    if modifications.is_empty() {
        SanitizeResult::unchanged(result)
    } else {
        SanitizeResult::modified(result, modifications)
    }
}

/// Escape HTML special characters
pub fn escape_html(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + input.len() / 4);

    for c in input.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }

    result
}

/// NFKC-normalize and trim a URL before pattern matching.
///
/// Full-width and compatibility characters fold to their ASCII forms.
pub fn normalize_url(url: &str) -> String {
    url.trim().nfkc().collect()
}

/// Parse a URL that must be `https` with a host and no embedded credentials
pub fn validate_https_url(raw: &str) -> GuardResult<url::Url> {
    if raw.len() > limits::MAX_URL_LENGTH {
        return Err(GuardError::security_violation("URL too long"));
    }

    let parsed = url::Url::parse(raw.trim())?;

    if parsed.scheme() != "https" {
        return Err(GuardError::security_violation(format!(
            "URL scheme '{}' is not allowed, https required",
            parsed.scheme()
        )));
    }

    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(GuardError::security_violation(
            "URLs with embedded credentials are not allowed",
        ));
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(GuardError::security_violation("URL has no host"));
    }

    Ok(parsed)
}
