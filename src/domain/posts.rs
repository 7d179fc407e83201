//! Post and comment text rules.

use crate::domain::error::DomainError;

/// Number of characters shown when a post or comment is rendered as a short label.
pub const PREVIEW_CHARS: usize = 15;

/// Borrow the first [`PREVIEW_CHARS`] characters of `text`.
pub fn preview(text: &str) -> &str {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Trim submitted body text and reject it when nothing is left.
pub fn normalize_body(field: &'static str, text: &str) -> Result<String, DomainError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, "This field is required."));
    }
    Ok(trimmed.to_string())
}
