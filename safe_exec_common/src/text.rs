//! Bounded text helpers. All limits count Unicode scalar values, so cuts
//! never land inside a multi-byte sequence.

use std::borrow::Cow;

/// Appended to captured script stdout that exceeded its cap.
pub const TRUNCATION_MARKER: &str = "\n...<truncated>...";

/// Ceiling for stderr/stdout snippets quoted in error details.
pub const DIAGNOSTIC_SNIPPET_CHARS: usize = 500;

/// Byte offset of the `n`th char, or `None` when the text is shorter.
fn char_boundary(text: &str, n: usize) -> Option<usize> {
    text.char_indices().nth(n).map(|(idx, _)| idx)
}

/// Keep the first `cap` chars and append [`TRUNCATION_MARKER`] when anything
/// was dropped. Text within the cap is returned untouched.
pub fn truncate_with_marker(text: &str, cap: usize) -> Cow<'_, str> {
    match char_boundary(text, cap) {
        None => Cow::Borrowed(text),
        Some(idx) => {
            let mut out = String::with_capacity(idx + TRUNCATION_MARKER.len());
            out.push_str(&text[..idx]);
            out.push_str(TRUNCATION_MARKER);
            Cow::Owned(out)
        }
    }
}

/// The first `n` chars of `text`.
pub fn head_chars(text: &str, n: usize) -> &str {
    match char_boundary(text, n) {
        None => text,
        Some(idx) => &text[..idx],
    }
}

/// The last `n` chars of `text`.
pub fn tail_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        None => text,
        Some((idx, _)) => &text[idx..],
    }
}
