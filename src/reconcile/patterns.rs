//! Fixed, versioned pattern catalogs for LLM/console output analysis.
//!
//! The catalogs are ordered and first-match-wins so classification is
//! reproducible. Bump `CATALOG_VERSION` whenever an entry changes.

use once_cell::sync::Lazy;
use regex::Regex;

pub const CATALOG_VERSION: u32 = 1;

/// High-confidence completion phrases. Any of these alone classifies the
/// output as passed, before error keywords are consulted.
pub const COMPLETION_PHRASES: &[&str] = &[
    "implementation complete",
    "implementation is complete",
    "all tests pass",
    "all tests passed",
    "task complete",
    "successfully implemented",
    "all review issues resolved",
];

pub const SUCCESS_KEYWORDS: &[&str] = &[
    "✅",
    "success",
    "passed",
    "complete",
    "done",
    "finished",
];

pub const ERROR_KEYWORDS: &[&str] = &[
    "✗",
    "❌",
    "error",
    "failed",
    "failure",
    "exception",
    "traceback",
    "cannot",
    "unable to",
];

pub const WARNING_KEYWORDS: &[&str] = &["warning", "warn:", "⚠", "deprecated"];

/// Terminal control sequences (CSI and OSC).
pub static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07]*(\x07|\x1b\\)").unwrap());

/// Concrete error-message lines (more than a bare keyword).
pub static ERROR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\berror\b\s*(\[[A-Z0-9]+\])?\s*:").unwrap());

/// Warning lines.
pub static WARNING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bwarning\b\s*(\[[A-Z0-9]+\])?\s*:?").unwrap());

/// Ordered patterns for files-changed counts. First match wins; the last
/// capture group of the winning pattern is the value.
pub static FILES_CHANGED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(\d+)\s+files?\s+changed",
        r"(?i)changed\s+(\d+)\s+files?",
        r"(?i)modified\s+(\d+)\s+files?",
        r"(?i)updated\s+(\d+)\s+files?",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub static LINES_ADDED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(\d+)\s+insertions?",
        r"(?i)added\s+(\d+)\s+lines?",
        r"(?i)(\d+)\s+lines?\s+added",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

pub static LINES_REMOVED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(\d+)\s+deletions?",
        r"(?i)removed\s+(\d+)\s+lines?",
        r"(?i)(\d+)\s+lines?\s+removed",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Natural-language change indicators, counted when no textual metric
/// pattern matched at all.
pub static CHANGE_INDICATORS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bcreated\s+(the\s+)?file\b",
        r"(?i)\bmodified\b",
        r"(?i)\bupdated\s+(the\s+)?file\b",
        r"(?i)\bwrote\s+(the\s+)?file\b",
        r"(?i)\bdeleted\s+(the\s+)?file\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Run an ordered pattern list over the text: first pattern that matches
/// wins, using its last capture group.
pub fn extract_metric(text: &str, patterns: &[Regex]) -> Option<u64> {
    for pattern in patterns {
        if let Some(caps) = pattern.captures(text) {
            let last = caps.len() - 1;
            if let Some(m) = caps.get(last) {
                if let Ok(value) = m.as_str().parse::<u64>() {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Count natural-language change indicators across the text.
pub fn count_change_indicators(text: &str) -> u64 {
    CHANGE_INDICATORS
        .iter()
        .map(|p| p.find_iter(text).count() as u64)
        .sum()
}

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_color_codes() {
        let colored = "\x1b[32mPASS\x1b[0m all good";
        assert_eq!(strip_ansi(colored), "PASS all good");
    }

    #[test]
    fn first_matching_pattern_wins() {
        let text = "changed 7 files, 3 files changed";
        // "3 files changed" matches the first pattern in the list.
        assert_eq!(extract_metric(text, &FILES_CHANGED_PATTERNS), Some(3));
    }

    #[test]
    fn falls_through_to_later_patterns() {
        let text = "I updated 4 files in total";
        assert_eq!(extract_metric(text, &FILES_CHANGED_PATTERNS), Some(4));
    }

    #[test]
    fn no_match_returns_none() {
        assert_eq!(extract_metric("nothing here", &FILES_CHANGED_PATTERNS), None);
    }

    #[test]
    fn counts_natural_language_indicators() {
        let text = "I created file src/a.rs, then modified src/b.rs and wrote file c.rs.";
        assert_eq!(count_change_indicators(text), 3);
    }
}
