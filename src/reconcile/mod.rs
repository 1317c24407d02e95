//! Output reconciliation: did an attempted code change actually happen?
//!
//! The LLM's free-text self-report is unreliable, so textual classification
//! is merged with version-control diff evidence. Diff evidence only ever
//! upgrades a verdict (inconclusive/failed text with a non-empty diff means
//! the work happened); it never downgrades an explicit textual success,
//! because a legitimately trivial task can leave a no-op-looking diff.

pub mod patterns;

use serde::Serialize;

use crate::error::Result;
use crate::vcs::DiffSummary;

/// Textual classification of one attempt's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextStatus {
    Passed,
    Failed,
    Partial,
    Unknown,
    Empty,
}

impl TextStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextStatus::Passed => "passed",
            TextStatus::Failed => "failed",
            TextStatus::Partial => "partial",
            TextStatus::Unknown => "unknown",
            TextStatus::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeMetrics {
    pub files_changed: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
}

/// Reconciled verdict for one attempt within a retry loop.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub succeeded: bool,
    pub status: TextStatus,
    pub raw_text: String,
    pub metrics: ChangeMetrics,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// True when diff evidence overrode an inconclusive or negative text
    /// classification.
    pub git_fallback_applied: bool,
}

impl ActionOutcome {
    /// Wrap an infrastructure error as a failed outcome, so the retry
    /// controller treats "attempt crashed" the same as "attempt reported
    /// failure".
    pub fn from_error(error: &crate::error::AppError) -> Self {
        Self {
            succeeded: false,
            status: TextStatus::Failed,
            raw_text: String::new(),
            metrics: ChangeMetrics::default(),
            errors: vec![error.to_string()],
            warnings: Vec::new(),
            git_fallback_applied: false,
        }
    }
}

/// Classify raw output text and merge it with diff evidence.
///
/// The diff arrives as a `Result` so a failed diff query (for example when
/// not inside a repository) degrades to a warning instead of crashing the
/// stage.
pub fn reconcile(raw_text: &str, diff: Result<DiffSummary>) -> ActionOutcome {
    let clean = patterns::strip_ansi(raw_text);
    let (status, errors, warnings) = classify_text(&clean);
    let mut metrics = extract_metrics(&clean);

    let mut final_status = status;
    let mut git_fallback_applied = false;

    match diff {
        Ok(summary) => {
            // Only inconclusive or negative classifications are eligible:
            // partial is already a success and keeps its warnings.
            let overridable = matches!(
                final_status,
                TextStatus::Failed | TextStatus::Unknown | TextStatus::Empty
            );
            if overridable && summary.total_files() > 0 {
                tracing::debug!(
                    text_status = status.as_str(),
                    diff_files = summary.total_files(),
                    "Diff evidence overrides textual classification"
                );
                final_status = TextStatus::Passed;
                git_fallback_applied = true;
                metrics = ChangeMetrics {
                    files_changed: summary.total_files(),
                    lines_added: summary.total_additions,
                    lines_removed: summary.total_deletions,
                };
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Diff query failed; keeping text-only classification");
        }
    }

    ActionOutcome {
        succeeded: matches!(final_status, TextStatus::Passed | TextStatus::Partial),
        status: final_status,
        raw_text: clean,
        metrics,
        errors,
        warnings,
        git_fallback_applied,
    }
}

/// Priority-ordered textual classification.
fn classify_text(clean: &str) -> (TextStatus, Vec<String>, Vec<String>) {
    if clean.trim().is_empty() {
        return (TextStatus::Empty, Vec::new(), Vec::new());
    }

    let lower = clean.to_lowercase();

    let errors: Vec<String> = clean
        .lines()
        .filter(|line| patterns::ERROR_LINE.is_match(line))
        .map(|line| line.trim().to_string())
        .collect();
    let warnings: Vec<String> = clean
        .lines()
        .filter(|line| {
            let lower_line = line.to_lowercase();
            patterns::WARNING_LINE.is_match(line)
                || patterns::WARNING_KEYWORDS
                    .iter()
                    .any(|k| lower_line.contains(k))
        })
        .map(|line| line.trim().to_string())
        .collect();

    let has_completion_phrase = patterns::COMPLETION_PHRASES
        .iter()
        .any(|p| lower.contains(p));
    let has_success_kw = patterns::SUCCESS_KEYWORDS
        .iter()
        .any(|k| lower.contains(&k.to_lowercase()));
    let has_error_kw = patterns::ERROR_KEYWORDS
        .iter()
        .any(|k| lower.contains(&k.to_lowercase()));

    let status = if has_completion_phrase {
        TextStatus::Passed
    } else if !errors.is_empty() {
        TextStatus::Failed
    } else if has_error_kw && !has_success_kw {
        TextStatus::Failed
    } else if has_success_kw && !warnings.is_empty() {
        TextStatus::Partial
    } else if has_success_kw {
        TextStatus::Passed
    } else {
        TextStatus::Unknown
    };

    (status, errors, warnings)
}

fn extract_metrics(clean: &str) -> ChangeMetrics {
    let files = patterns::extract_metric(clean, &patterns::FILES_CHANGED_PATTERNS);
    let added = patterns::extract_metric(clean, &patterns::LINES_ADDED_PATTERNS);
    let removed = patterns::extract_metric(clean, &patterns::LINES_REMOVED_PATTERNS);

    // No textual metric at all: fall back to counting natural-language
    // change indicators.
    let files_changed = match files {
        Some(n) => n,
        None => patterns::count_change_indicators(clean),
    };

    ChangeMetrics {
        files_changed,
        lines_added: added.unwrap_or(0),
        lines_removed: removed.unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn diff(files_modified: u64) -> Result<DiffSummary> {
        Ok(DiffSummary {
            files_modified,
            ..DiffSummary::default()
        })
    }

    #[test]
    fn failed_text_with_nonempty_diff_is_upgraded() {
        let outcome = reconcile("✗ Implementation failed", diff(2));
        assert!(outcome.succeeded);
        assert_eq!(outcome.status, TextStatus::Passed);
        assert_eq!(outcome.metrics.files_changed, 2);
        assert!(outcome.git_fallback_applied);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn explicit_completion_is_not_downgraded_by_empty_diff() {
        let outcome = reconcile("Implementation Complete! ✅", diff(0));
        assert!(outcome.succeeded);
        assert_eq!(outcome.status, TextStatus::Passed);
        assert!(!outcome.git_fallback_applied);
    }

    #[test]
    fn completion_phrase_beats_error_keywords() {
        let text = "Fixed the error handling. Implementation complete.";
        let outcome = reconcile(text, diff(0));
        assert_eq!(outcome.status, TextStatus::Passed);
    }

    #[test]
    fn concrete_error_lines_mean_failed() {
        let text = "Tried to build.\nerror[E0308]: mismatched types\nGiving up.";
        let outcome = reconcile(text, diff(0));
        assert_eq!(outcome.status, TextStatus::Failed);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("E0308"));
    }

    #[test]
    fn partial_is_not_rewritten_by_diff_evidence() {
        let text = "Build finished successfully.\nwarning: unused variable `x`";
        let outcome = reconcile(text, diff(2));
        assert_eq!(outcome.status, TextStatus::Partial);
        assert!(outcome.succeeded);
        assert!(!outcome.git_fallback_applied);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn success_with_warnings_is_partial() {
        let text = "Build finished successfully.\nwarning: unused variable `x`";
        let outcome = reconcile(text, diff(0));
        assert_eq!(outcome.status, TextStatus::Partial);
        assert!(outcome.succeeded);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn warning_symbols_without_the_word_warning_demote_to_partial() {
        let outcome = reconcile("✅ Build succeeded.\n⚠ deprecated API used", diff(0));
        assert_eq!(outcome.status, TextStatus::Partial);
        assert!(outcome.succeeded);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn empty_text_with_empty_diff_is_empty() {
        let outcome = reconcile("   \n", diff(0));
        assert_eq!(outcome.status, TextStatus::Empty);
        assert!(!outcome.succeeded);
    }

    #[test]
    fn empty_text_with_changes_is_upgraded() {
        let outcome = reconcile("", diff(3));
        assert_eq!(outcome.status, TextStatus::Passed);
        assert!(outcome.succeeded);
        assert_eq!(outcome.metrics.files_changed, 3);
    }

    #[test]
    fn neutral_text_is_unknown() {
        let outcome = reconcile("considering the options", diff(0));
        assert_eq!(outcome.status, TextStatus::Unknown);
        assert!(!outcome.succeeded);
    }

    #[test]
    fn diff_query_failure_keeps_text_classification() {
        let outcome = reconcile(
            "Implementation complete.",
            Err(AppError::Git("not a repository".to_string())),
        );
        assert_eq!(outcome.status, TextStatus::Passed);
        assert!(!outcome.git_fallback_applied);

        let outcome = reconcile("✗ failed", Err(AppError::Git("not a repository".to_string())));
        assert_eq!(outcome.status, TextStatus::Failed);
    }

    #[test]
    fn textual_metrics_are_extracted() {
        let text = "Done: 3 files changed, 40 insertions(+), 7 deletions(-)";
        let outcome = reconcile(text, diff(0));
        assert_eq!(outcome.metrics.files_changed, 3);
        assert_eq!(outcome.metrics.lines_added, 40);
        assert_eq!(outcome.metrics.lines_removed, 7);
    }

    #[test]
    fn indicator_fallback_when_no_metric_pattern_matches() {
        let text = "I created file src/alpha.rs and modified the parser. All tests pass.";
        let outcome = reconcile(text, diff(0));
        assert_eq!(outcome.metrics.files_changed, 2);
    }

    #[test]
    fn ansi_sequences_are_stripped_before_analysis() {
        let text = "\x1b[31m✗ failed\x1b[0m";
        let outcome = reconcile(text, diff(0));
        assert_eq!(outcome.status, TextStatus::Failed);
        assert!(!outcome.raw_text.contains('\x1b'));
    }

    #[test]
    fn diff_preferred_over_text_metrics_when_fallback_fires() {
        let diff = Ok(DiffSummary {
            files_modified: 5,
            total_additions: 100,
            total_deletions: 20,
            ..DiffSummary::default()
        });
        let outcome = reconcile("✗ failed, 1 file changed", diff);
        assert_eq!(outcome.metrics.files_changed, 5);
        assert_eq!(outcome.metrics.lines_added, 100);
        assert_eq!(outcome.metrics.lines_removed, 20);
    }
}
