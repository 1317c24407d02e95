//! Build stage: run the implementation prompt inside a build-verification
//! resolution loop, then commit and open (or refresh) the pull request.

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::llm::{LlmClient, Session};
use crate::prompt;
use crate::reconcile::{self, ActionOutcome};
use crate::retry::{run_resolution_loop, ResolutionStage, RetryPolicy};
use crate::router::TaskCategory;
use crate::state::fields;
use crate::workflow::progress::TrackerSink;
use crate::workflow::types::StageOutcome;
use crate::workflow::{truncate, StageContext};

struct BuildVerification<'a> {
    ctx: &'a StageContext,
    llm: &'a LlmClient,
    session: &'a Session,
    issue_title: String,
    plan: String,
}

#[async_trait]
impl ResolutionStage for BuildVerification<'_> {
    async fn execute(&mut self, attempt: u32) -> Result<String> {
        let binding = self.ctx.router.resolve(TaskCategory::Implementation);
        let prompt = if attempt == 1 {
            prompt::implementation(&self.issue_title, &self.plan)
        } else {
            prompt::verify_implementation(&self.issue_title)
        };
        let response = self
            .llm
            .send(self.session, &prompt, binding, TaskCategory::Implementation)
            .await?;
        Ok(response.text)
    }

    async fn evaluate(&mut self, raw: &str) -> Result<ActionOutcome> {
        let diff = self.ctx.vcs.diff_summary().await;
        Ok(reconcile::reconcile(raw, diff))
    }

    async fn remediate(&mut self, failed: &ActionOutcome) -> Result<ActionOutcome> {
        let binding = self.ctx.router.resolve(TaskCategory::Implementation);
        let prompt = prompt::remediation("build", &failed.errors);
        let response = self
            .llm
            .send(self.session, &prompt, binding, TaskCategory::Implementation)
            .await?;
        let diff = self.ctx.vcs.diff_summary().await;
        Ok(reconcile::reconcile(&response.text, diff))
    }

    fn describe(&self) -> String {
        "build-verification".to_string()
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
    let plan_ref = state.require(fields::PLAN_REF)?.to_string();

    ctx.vcs.create_or_checkout_branch(&branch).await?;
    let plan = tokio::fs::read_to_string(&plan_ref).await?;
    let issue = ctx.tracker.fetch_issue(&issue_id).await?;

    let llm = ctx.llm("builder");
    let mut session = llm.open().await?;
    let sink = TrackerSink::new(ctx.tracker.as_ref(), &issue_id);

    let mut stage = BuildVerification {
        ctx,
        llm: &llm,
        session: &session,
        issue_title: issue.title.clone(),
        plan,
    };
    let result = run_resolution_loop(&mut stage, RetryPolicy::BUILD_VERIFICATION, &sink).await;

    if !result.succeeded() {
        let verdict = if result.stalled { "stalled" } else { "exhausted" };
        state.set(fields::BUILD_RESULT, verdict);
        ctx.store.save(&mut state, "build")?;
        llm.close(&mut session);
        return Ok(if result.stalled {
            StageOutcome::Stalled {
                stage: "build-verification".to_string(),
            }
        } else {
            StageOutcome::LoopExhausted {
                stage: "build-verification".to_string(),
            }
        });
    }

    let summary = truncate(&result.final_outcome.raw_text, 1_500);

    // Commit with a generated message; a hook rejection is a hard error the
    // operator has to look at, not something remediation can fix.
    let binding = ctx.router.resolve(TaskCategory::CommitMessage);
    let commit_msg = llm
        .send(
            &session,
            &prompt::commit_message(&issue.title, &summary),
            binding,
            TaskCategory::CommitMessage,
        )
        .await?
        .text
        .trim()
        .to_string();
    let commit = ctx.vcs.stage_and_commit(&commit_msg).await?;
    if !commit.success {
        llm.close(&mut session);
        let reason = if commit.hook_failure_detected {
            "a commit hook rejected the change"
        } else {
            "git commit failed"
        };
        return Err(AppError::Git(format!(
            "{reason}: {}",
            truncate(&commit.raw_output, 500)
        )));
    }

    // Create the PR, or refresh it when re-running the stage for this branch.
    let binding = ctx.router.resolve(TaskCategory::PrDescription);
    let description = llm
        .send(
            &session,
            &prompt::pr_description(&issue, &summary),
            binding,
            TaskCategory::PrDescription,
        )
        .await?
        .text;
    let host = ctx.host.as_ref().ok_or_else(|| {
        AppError::Config("[tracker.github] is required for pull-request operations".to_string())
    })?;
    let url = if host.find_open_pull_request(&branch).await?.is_some() {
        host.update_pull_request(&branch, &issue.title, &description)
            .await?
    } else {
        host.create_pull_request(&branch, &issue.title, &description)
            .await?
    };
    tracing::info!(pr = %url, "Pull request ready");

    let _ = ctx
        .tracker
        .post_comment(&issue_id, &format!("🚀 Changes pushed to `{branch}`: {url}"))
        .await;

    state.set(fields::BUILD_RESULT, "passed");
    state.set(fields::PR_URL, &url);
    ctx.store.save(&mut state, "build")?;

    llm.close(&mut session);
    Ok(StageOutcome::Completed)
}
