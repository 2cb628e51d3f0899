//! Token estimation.
//!
//! Uses a character-based heuristic: ~4 characters per token, rounded up.
//! Counting chars rather than bytes keeps non-ASCII clinical text (accents,
//! CJK names) from being over-charged.

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    estimate_for_chars(text.chars().count())
}

/// Estimate tokens for a text of `chars` characters.
pub fn estimate_for_chars(chars: usize) -> usize {
    chars.div_ceil(4)
}
