//! Normalization of uploaded credential content into valid JSON text
//!
//! Upload tooling tends to decorate files: a line number glued to the front,
//! a byte-order mark, trailing newlines, or a chatty sentence around the
//! payload. Cleaning peels those off in a fixed order and falls back to the
//! untouched input, so cleaning can never turn valid JSON into invalid JSON.

use crate::error::SanitizeError;
use serde::de::IgnoredAny;

const BOM: char = '\u{feff}';

/// Returns the first representation of `raw` that parses as JSON.
///
/// Order: leading digits stripped, BOM stripped, whitespace/control trimmed;
/// then the first balanced `{...}` or `[...]` span; then the original text.
pub fn clean(raw: &str) -> Result<String, SanitizeError> {
    if raw.trim().is_empty() {
        return Err(SanitizeError::Empty);
    }

    let stripped = raw.trim_start_matches(|c: char| c.is_ascii_digit());
    let stripped = stripped.strip_prefix(BOM).unwrap_or(stripped);
    let trimmed = stripped.trim_matches(|c: char| c.is_whitespace() || c.is_control() || c == BOM);

    let first_error = match parse(trimmed) {
        Ok(()) => return Ok(trimmed.to_string()),
        Err(err) => err,
    };

    if let Some(span) = find_json_span(trimmed) {
        return Ok(span.to_string());
    }

    match parse(raw) {
        Ok(()) => Ok(raw.to_string()),
        Err(_) => Err(SanitizeError::Unparseable(first_error.to_string())),
    }
}

/// Byte-level entry point; uploads must be UTF-8.
pub fn clean_bytes(raw: &[u8]) -> Result<String, SanitizeError> {
    let text = std::str::from_utf8(raw).map_err(|_| SanitizeError::NotUtf8)?;
    clean(text)
}

fn parse(text: &str) -> Result<(), serde_json::Error> {
    serde_json::from_str::<IgnoredAny>(text).map(|_| ())
}

/// Finds the first balanced top-level object or array that parses.
fn find_json_span(text: &str) -> Option<&str> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find(['{', '[']) {
        let start = search_from + offset;
        if let Some(end) = balanced_end(text, start) {
            let span = &text[start..end];
            if parse(span).is_ok() {
                return Some(span);
            }
        }
        search_from = start + 1;
    }
    None
}

/// Scans from an opening bracket to its matching close, ignoring brackets
/// inside string literals. Returns the exclusive end offset.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, byte) in text.bytes().enumerate().skip(start) {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(byte) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(idx + 1);
                }
            }
            _ => {}
        }
    }
    None
}
