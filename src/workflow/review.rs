//! Review stage: run an automated review over the change, then resolve
//! blocker findings in a bounded loop. Lower-severity findings are reported
//! to the tracker but never retried.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, Result};
use crate::llm::{LlmClient, Session};
use crate::platform::types::{ReviewFinding, Severity};
use crate::prompt;
use crate::reconcile::{self, ActionOutcome, ChangeMetrics, TextStatus};
use crate::retry::{run_resolution_loop, ResolutionStage, RetryPolicy};
use crate::router::TaskCategory;
use crate::state::fields;
use crate::workflow::progress::TrackerSink;
use crate::workflow::types::StageOutcome;
use crate::workflow::{truncate, StageContext};

static FINDING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*[-*]?\s*(blocker|critical|major|high|minor|low|info|nit)\s*:\s*(.+)$")
        .unwrap()
});

/// Parse `severity: description` lines out of the review response.
fn parse_findings(text: &str) -> Vec<ReviewFinding> {
    text.lines()
        .filter_map(|line| {
            let caps = FINDING_LINE.captures(line)?;
            Some(ReviewFinding {
                severity: Severity::parse(&caps[1]),
                description: caps[2].trim().to_string(),
                location: None,
            })
        })
        .collect()
}

struct ReviewPass<'a> {
    ctx: &'a StageContext,
    llm: &'a LlmClient,
    session: &'a Session,
    change_description: String,
    blockers: Vec<ReviewFinding>,
    non_blockers: Vec<ReviewFinding>,
}

#[async_trait]
impl ResolutionStage for ReviewPass<'_> {
    async fn execute(&mut self, _attempt: u32) -> Result<String> {
        let binding = self.ctx.router.resolve(TaskCategory::Review);
        let response = self
            .llm
            .send(
                self.session,
                &prompt::review(&self.change_description),
                binding,
                TaskCategory::Review,
            )
            .await?;
        Ok(response.text)
    }

    /// The verdict is structural, not textual: a review pass succeeds
    /// exactly when it reports no blocker findings. Lower severities are
    /// kept for reporting but do not fail the pass.
    async fn evaluate(&mut self, raw: &str) -> Result<ActionOutcome> {
        let findings = parse_findings(raw);
        let (blockers, rest): (Vec<_>, Vec<_>) = findings
            .into_iter()
            .partition(|f| f.severity == Severity::Blocker);

        self.blockers = blockers;
        if self.non_blockers.is_empty() {
            self.non_blockers = rest;
        }

        let succeeded = self.blockers.is_empty();
        Ok(ActionOutcome {
            succeeded,
            status: if succeeded {
                TextStatus::Passed
            } else {
                TextStatus::Failed
            },
            raw_text: raw.to_string(),
            metrics: ChangeMetrics::default(),
            errors: self
                .blockers
                .iter()
                .map(|f| f.description.clone())
                .collect(),
            warnings: self
                .non_blockers
                .iter()
                .map(|f| format!("{}: {}", f.severity.as_str(), f.description))
                .collect(),
            git_fallback_applied: false,
        })
    }

    async fn remediate(&mut self, failed: &ActionOutcome) -> Result<ActionOutcome> {
        let binding = self.ctx.router.resolve(TaskCategory::Implementation);
        let response = self
            .llm
            .send(
                self.session,
                &prompt::review_fix(&failed.errors),
                binding,
                TaskCategory::Implementation,
            )
            .await?;
        let diff = self.ctx.vcs.diff_summary().await;
        Ok(reconcile::reconcile(&response.text, diff))
    }

    fn describe(&self) -> String {
        "review-repair".to_string()
    }
}

pub async fn run(ctx: &StageContext) -> Result<StageOutcome> {
    let mut state = ctx.store.load(&ctx.run_id)?.ok_or_else(|| {
        AppError::State(format!(
            "no state for run {} (run the plan stage first)",
            ctx.run_id
        ))
    })?;
    let issue_id = state.require(fields::ISSUE_ID)?.to_string();
    let branch = state.require(fields::BRANCH)?.to_string();
    ctx.vcs.create_or_checkout_branch(&branch).await?;

    let plan = match state.get(fields::PLAN_REF) {
        Some(path) => tokio::fs::read_to_string(path).await.unwrap_or_default(),
        None => String::new(),
    };
    let diff = ctx.vcs.diff_summary().await.unwrap_or_default();
    let change_description = format!(
        "Branch `{branch}` ({} files changed, +{} / -{} lines).\n\n## Plan\n{}",
        diff.total_files(),
        diff.total_additions,
        diff.total_deletions,
        truncate(&plan, 3_000)
    );

    let llm = ctx.llm("reviewer");
    let mut session = llm.open().await?;
    let sink = TrackerSink::new(ctx.tracker.as_ref(), &issue_id);

    let mut stage = ReviewPass {
        ctx,
        llm: &llm,
        session: &session,
        change_description,
        blockers: Vec::new(),
        non_blockers: Vec::new(),
    };
    let result = run_resolution_loop(&mut stage, RetryPolicy::REVIEW_REPAIR, &sink).await;

    // Non-blocking findings are reported once, never retried.
    if !stage.non_blockers.is_empty() {
        let list = stage
            .non_blockers
            .iter()
            .map(|f| format!("- **{}**: {}", f.severity.as_str(), f.description))
            .collect::<Vec<_>>()
            .join("\n");
        let _ = ctx
            .tracker
            .post_comment(
                &issue_id,
                &format!("📝 Non-blocking review findings:\n\n{list}"),
            )
            .await;
    }

    let outcome = if result.succeeded() {
        state.set(fields::REVIEW_RESULT, "approved");
        StageOutcome::Completed
    } else if result.stalled {
        state.set(fields::REVIEW_RESULT, "stalled");
        StageOutcome::Stalled {
            stage: "review-repair".to_string(),
        }
    } else {
        state.set(fields::REVIEW_RESULT, "exhausted");
        StageOutcome::LoopExhausted {
            stage: "review-repair".to_string(),
        }
    };
    ctx.store.save(&mut state, "review")?;
    llm.close(&mut session);
    Ok(outcome)
}
