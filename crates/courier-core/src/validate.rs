//! Content and attachment validation for inbound chat frames.
//!
//! Accepted content is returned HTML-escaped; the escaped form is what gets
//! persisted and routed.

use crate::error::{CourierError, CourierResult};
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum message length in Unicode scalar values.
pub const MAX_CONTENT_CHARS: usize = 500;

/// Maximum length of an image reference in bytes.
pub const MAX_IMAGE_PATH_LEN: usize = 200;

static DISALLOWED_MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)<script|javascript:|onerror=|onload=|onclick=|<iframe|<object|<embed|eval\(|expression\(|vbscript:",
    )
    .expect("static markup pattern")
});

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{100,}").expect("static whitespace pattern"));

/// Validate message content and return its sanitised form.
///
/// With `allow_empty` (an image is attached), blank content is accepted and
/// normalised to an empty string.
pub fn validate_content(content: &str, allow_empty: bool) -> CourierResult<String> {
    if content.trim().is_empty() {
        if allow_empty {
            return Ok(String::new());
        }
        return Err(CourierError::validation(
            "content",
            "Message content cannot be empty",
        ));
    }

    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(CourierError::validation(
            "content",
            format!("Message exceeds maximum length of {MAX_CONTENT_CHARS} characters"),
        ));
    }

    if DISALLOWED_MARKUP.is_match(content) {
        return Err(CourierError::validation(
            "content",
            "Message contains potentially dangerous content",
        ));
    }

    if WHITESPACE_RUN.is_match(content) {
        return Err(CourierError::validation(
            "content",
            "Message contains excessive whitespace",
        ));
    }

    let mut sanitized = escape_html(content);
    sanitized.retain(|c| c != '\0');
    Ok(sanitized)
}

/// Validate an optional image reference. Empty references are accepted.
pub fn validate_image_path(path: &str) -> CourierResult<()> {
    if path.is_empty() {
        return Ok(());
    }
    if path.len() > MAX_IMAGE_PATH_LEN {
        return Err(CourierError::validation(
            "image_path",
            format!("Image path exceeds maximum length of {MAX_IMAGE_PATH_LEN}"),
        ));
    }
    if path.contains("..") {
        return Err(CourierError::validation("image_path", "Invalid image path"));
    }
    if !path.starts_with('/') && !path.starts_with("uploads/") {
        return Err(CourierError::validation(
            "image_path",
            "Invalid image path format",
        ));
    }
    Ok(())
}

/// Escape the five HTML-significant characters.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
