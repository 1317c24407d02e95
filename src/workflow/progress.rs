//! Progress notifications from resolution loops to the issue tracker.

use async_trait::async_trait;

use crate::platform::IssueTracker;
use crate::retry::{ProgressEvent, ProgressSink};

/// Posts loop progress as tracker comments so a human can follow along
/// without reading logs. Posting is best-effort: a tracker hiccup must not
/// interrupt the loop.
pub struct TrackerSink<'a> {
    tracker: &'a dyn IssueTracker,
    issue_id: String,
}

impl<'a> TrackerSink<'a> {
    pub fn new(tracker: &'a dyn IssueTracker, issue_id: &str) -> Self {
        Self {
            tracker,
            issue_id: issue_id.to_string(),
        }
    }

    fn render(event: &ProgressEvent) -> String {
        match event {
            ProgressEvent::AttemptStarted {
                stage,
                attempt,
                max_attempts,
            } => format!("⏳ **{stage}**: attempt {attempt}/{max_attempts} started."),
            ProgressEvent::AttemptFailed {
                stage,
                attempt,
                errors,
            } => {
                let detail = if errors.is_empty() {
                    String::new()
                } else {
                    format!("\n```\n{}\n```", errors.join("\n"))
                };
                format!("⚠️ **{stage}**: attempt {attempt} failed.{detail}")
            }
            ProgressEvent::RemediationApplied {
                stage,
                attempt,
                files_changed,
                succeeded,
            } => format!(
                "🔧 **{stage}**: remediation after attempt {attempt} ({files_changed} files changed, {}).",
                if *succeeded { "reported success" } else { "reported failure" }
            ),
            ProgressEvent::Finished {
                stage,
                attempts_used,
                succeeded,
                exhausted,
                stalled,
            } => {
                let verdict = if *succeeded {
                    "succeeded"
                } else if *stalled {
                    "stopped early (no progress)"
                } else if *exhausted {
                    "failed, retry budget exhausted"
                } else {
                    "failed"
                };
                format!("🏁 **{stage}**: {verdict} after {attempts_used} attempt(s).")
            }
        }
    }
}

#[async_trait]
impl ProgressSink for TrackerSink<'_> {
    async fn publish(&self, event: ProgressEvent) {
        let text = Self::render(&event);
        if let Err(e) = self.tracker.post_comment(&self.issue_id, &text).await {
            tracing::warn!(error = %e, "Failed to post progress comment");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_rendering_distinguishes_stall_from_exhaustion() {
        let stalled = TrackerSink::render(&ProgressEvent::Finished {
            stage: "test-repair".to_string(),
            attempts_used: 2,
            succeeded: false,
            exhausted: false,
            stalled: true,
        });
        assert!(stalled.contains("no progress"));

        let exhausted = TrackerSink::render(&ProgressEvent::Finished {
            stage: "test-repair".to_string(),
            attempts_used: 4,
            succeeded: false,
            exhausted: true,
            stalled: false,
        });
        assert!(exhausted.contains("exhausted"));
    }
}
