//! Token estimation for the pre-flight context-window guard.
//!
//! Deliberately a heuristic: roughly four characters per token, floored at
//! the whitespace word count so terse symbol-heavy prompts are not
//! underestimated. Exact tokenizer integration is out of scope; the guard
//! only needs to catch prompts that are clearly too large before a network
//! round trip is wasted on them.

use crate::error::{AppError, Result};

const CHARS_PER_TOKEN: u64 = 4;

/// Estimate the token count of a prompt.
pub fn estimate(text: &str) -> u64 {
    let by_chars = (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN);
    let by_words = text.split_whitespace().count() as u64;
    by_chars.max(by_words)
}

/// Check a prompt against a model's context limit.
///
/// Returns the estimated count on success so callers can log it. On
/// overflow returns `AppError::TokenLimit` carrying the count, the limit,
/// and the overage percentage.
pub fn preflight(text: &str, limit: u64) -> Result<u64> {
    let count = estimate(text);
    if count > limit {
        return Err(AppError::token_limit(count, limit));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_scales_with_length() {
        assert_eq!(estimate(""), 0);
        // 40 chars / 4 = 10 tokens
        let text = "a".repeat(40);
        assert_eq!(estimate(&text), 10);
    }

    #[test]
    fn estimate_floors_at_word_count() {
        // 10 single-char words: 19 chars -> 5 by chars, but 10 words
        let text = "a b c d e f g h i j";
        assert_eq!(estimate(text), 10);
    }

    #[test]
    fn preflight_passes_within_limit() {
        assert_eq!(preflight("hello world", 100).unwrap(), 3);
    }

    #[test]
    fn preflight_reports_count_limit_and_overage() {
        let text = "a".repeat(600); // 150 tokens
        let err = preflight(&text, 100).unwrap_err();
        match err {
            AppError::TokenLimit {
                count,
                limit,
                overage_percent,
            } => {
                assert_eq!(count, 150);
                assert_eq!(limit, 100);
                assert_eq!(overage_percent, 50);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
